//! End-to-end tests: the plugin loaded through the manager rewrites
//! `new-download` actions delivered by the host.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use ferrix_core::config::{BridgeConfig, ProberConfig};
use ferrix_core::events::NewDownload;
use ferrix_core::RegistryAction;
use ferrix_core::error::ErrorKind;
use ferrix_plugin::{Dispatcher, EventKey, EventPayload, MemoryHost, PluginManager};
use plugin_batch::BatchExpansionPlugin;
use plugin_batch::plugin::PLUGIN_ID;

const WAIT: Duration = Duration::from_secs(5);

async fn setup(existing: &[&str]) -> (Arc<MemoryHost>, PluginManager) {
    let host = Arc::new(MemoryHost::with_existing(existing.iter().copied()));
    let dispatcher = Arc::new(Dispatcher::new(host.clone(), BridgeConfig::default()));
    let manager = PluginManager::new(dispatcher);
    manager
        .load_plugin(Arc::new(BatchExpansionPlugin::new(ProberConfig::default())))
        .await
        .unwrap();
    (host, manager)
}

#[tokio::test]
async fn test_range_url_is_expanded() {
    let (host, _manager) = setup(&["http://x/f1.bin", "http://x/f2.bin"]).await;
    let event_id = host.active_registrations("new-download")[0].clone();
    let key = EventKey::new("new-download", "k1");

    let delivery: EventPayload = serde_json::from_value(json!({
        "action": { "event": "new-download", "payload": { "url": "http://x/f{1..2}.bin" } },
        "key": { "event": "new-download", "id": "k1" }
    }))
    .unwrap();
    host.deliver(&event_id, delivery).unwrap();

    let completion = host.wait_for_completion(&key, &event_id, WAIT).await.unwrap();
    let muted = completion.muted_action.expect("download was not rewritten");

    assert_eq!(muted.event_name(), "new-download");
    assert_eq!(muted.payload()["url"], "http://x/f1.bin\nhttp://x/f2.bin");
}

#[tokio::test]
async fn test_expansion_keeps_other_fields() {
    let (host, _manager) = setup(&["http://x/a01.zip", "http://x/a03.zip"]).await;
    let mut download = NewDownload::new("  http://x/a[01-03].zip ");
    download.options = Some(json!({ "save_path": "/tmp/dl", "file_path": "/tmp/dl/a" }));
    download.extra.insert("category".to_string(), json!("archives"));

    let outcome = host
        .run_event_job(RegistryAction::NewDownload(download.clone()), "k1", WAIT)
        .await
        .unwrap();

    let RegistryAction::NewDownload(rewritten) = outcome else {
        panic!("expected new-download, got {outcome:?}");
    };
    assert_eq!(rewritten.url, "http://x/a01.zip\nhttp://x/a03.zip");
    assert_eq!(rewritten.options, download.options);
    assert_eq!(rewritten.extra["category"], "archives");
}

#[tokio::test]
async fn test_expansion_with_engine_option_shapes() {
    let (host, _manager) = setup(&["http://x/f1.bin", "http://x/f2.bin"]).await;
    let action = RegistryAction::from_parts(
        "new-download",
        json!({
            "url": "http://x/f{1..2}.bin",
            "options": {
                "chunk_count": 5,
                "file_path": "/dl",
                "max_retries": 300,
                "headers": [{ "key": "A", "value": "b" }]
            }
        }),
    );

    let outcome = host.run_event_job(action, "k1", WAIT).await.unwrap();

    assert_eq!(
        outcome.payload(),
        json!({
            "url": "http://x/f1.bin\nhttp://x/f2.bin",
            "options": {
                "chunk_count": 5,
                "file_path": "/dl",
                "max_retries": 300,
                "headers": [{ "key": "A", "value": "b" }]
            }
        })
    );
}

#[tokio::test]
async fn test_plain_url_is_untouched() {
    let (host, _manager) = setup(&[]).await;
    let action = RegistryAction::NewDownload(NewDownload::new("http://x/file.iso"));

    let outcome = host.run_event_job(action.clone(), "k1", WAIT).await.unwrap();

    assert_eq!(outcome, action);
    assert!(host.head_calls().is_empty());
    assert!(host.completions()[0].muted_action.is_none());
}

#[tokio::test]
async fn test_no_existing_candidates_leaves_url() {
    let (host, _manager) = setup(&[]).await;
    let action = RegistryAction::NewDownload(NewDownload::new("http://x/f{1..3}.bin"));

    let outcome = host.run_event_job(action.clone(), "k1", WAIT).await.unwrap();

    assert_eq!(outcome, action);
    assert_eq!(host.head_calls().len(), 3);
}

#[tokio::test]
async fn test_unparseable_pattern_is_untouched() {
    let (host, _manager) = setup(&[]).await;
    let action = RegistryAction::NewDownload(NewDownload::new("http://x/{9..2}.bin"));

    let outcome = host.run_event_job(action.clone(), "k1", WAIT).await.unwrap();

    assert_eq!(outcome, action);
    assert!(host.head_calls().is_empty());
}

#[tokio::test]
async fn test_unload_unregisters_plugin() {
    let (host, manager) = setup(&[]).await;
    assert_eq!(host.active_registrations("new-download").len(), 1);

    manager.unload_plugin(PLUGIN_ID).await.unwrap();

    assert!(host.active_registrations("new-download").is_empty());
    assert_eq!(manager.dispatcher().registration_count().await, 0);
}

#[tokio::test]
async fn test_invalid_prober_settings_refuse_to_load() {
    let host = Arc::new(MemoryHost::new());
    let dispatcher = Arc::new(Dispatcher::new(host.clone(), BridgeConfig::default()));
    let manager = PluginManager::new(dispatcher);
    let config = ProberConfig {
        concurrency: 0,
        ..ProberConfig::default()
    };

    let err = manager
        .load_plugin(Arc::new(BatchExpansionPlugin::new(config)))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Plugin);
    assert!(err.message.contains("Invalid prober settings"));
    assert!(host.active_registrations("new-download").is_empty());
}
