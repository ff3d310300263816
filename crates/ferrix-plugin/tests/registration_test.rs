//! Integration tests for registration lifecycle and acknowledgement.

mod helpers;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use ferrix_core::config::BridgeConfig;
use ferrix_core::error::ErrorKind;
use ferrix_core::events::NewDownload;
use ferrix_core::{AppError, AppResult, RegistryAction};
use ferrix_plugin::{ClosureHandler, EventKey, EventPayload, HostCommand};

use helpers::{TestBridge, WAIT, capturing, noop};

#[tokio::test]
async fn test_on_registers_with_host() {
    let bridge = TestBridge::new();

    let sub = bridge
        .dispatcher
        .on("new-download", noop("test"))
        .await
        .unwrap();

    assert_eq!(bridge.host.register_count(sub.id()), 1);
    assert!(bridge.host.is_listening(sub.id()));
    assert_eq!(
        bridge.host.active_registrations("new-download"),
        vec![sub.id().to_string()]
    );
    assert!(bridge.dispatcher.is_registered(sub.id()).await);
}

#[tokio::test]
async fn test_registration_ids_are_unique() {
    let bridge = TestBridge::new();

    let a = bridge.dispatcher.on("new-download", noop("a")).await.unwrap();
    let b = bridge.dispatcher.on("new-download", noop("b")).await.unwrap();

    assert_ne!(a.id(), b.id());
    assert_eq!(bridge.dispatcher.registration_count().await, 2);
}

#[tokio::test]
async fn test_off_is_idempotent() {
    let bridge = TestBridge::new();
    let sub = bridge
        .dispatcher
        .on("new-download", noop("test"))
        .await
        .unwrap();

    sub.off().await;
    sub.off().await;
    sub.registration().off().await;

    assert_eq!(bridge.host.unregister_count(sub.id()), 1);
    assert!(!bridge.host.is_listening(sub.id()));
    assert!(!sub.registration().is_active());
    assert!(!bridge.dispatcher.is_registered(sub.id()).await);
    assert!(bridge.host.active_registrations("new-download").is_empty());
}

#[tokio::test]
async fn test_completion_sent_after_success() {
    let bridge = TestBridge::new();
    let sub = bridge
        .dispatcher
        .on("new-download", noop("test"))
        .await
        .unwrap();

    let outcome = bridge.run_new_download("http://x/a.bin", "1").await;

    assert_eq!(
        outcome,
        RegistryAction::NewDownload(NewDownload::new("http://x/a.bin"))
    );

    let completions = bridge.host.completions();
    assert_eq!(completions.len(), 1);
    assert_eq!(completions[0].event_id, sub.id());
    assert_eq!(completions[0].action_key, EventKey::new("new-download", "1"));
    assert!(completions[0].muted_action.is_none());
}

#[tokio::test]
async fn test_completion_sent_after_handler_error() {
    let bridge = TestBridge::new();
    let handler = ClosureHandler::arc("failing", |_, _| async {
        AppResult::<()>::Err(AppError::internal("boom"))
    });
    bridge.dispatcher.on("new-download", handler).await.unwrap();

    bridge.run_new_download("http://x/a.bin", "1").await;

    let completions = bridge.host.completions();
    assert_eq!(completions.len(), 1);
    assert!(completions[0].muted_action.is_none());
}

#[tokio::test]
async fn test_completion_sent_after_handler_panic() {
    let bridge = TestBridge::new();
    let handler = ClosureHandler::arc("panicking", |_, _| async {
        if true {
            panic!("handler blew up");
        }
        AppResult::Ok(())
    });
    let sub = bridge.dispatcher.on("new-download", handler).await.unwrap();

    bridge.run_new_download("http://x/a.bin", "1").await;
    assert_eq!(bridge.host.completions().len(), 1);

    // The listener survives the panic and keeps serving deliveries.
    bridge.run_new_download("http://x/b.bin", "2").await;
    assert_eq!(bridge.host.completions().len(), 2);
    assert!(sub.registration().is_active());
}

#[tokio::test]
async fn test_mutate_produces_muted_action() {
    let bridge = TestBridge::new();
    let handler = ClosureHandler::arc("mutating", |registration, _| async move {
        registration.mutate(&json!({ "url": "http://x/b.bin" }));
        AppResult::Ok(())
    });
    bridge.dispatcher.on("new-download", handler).await.unwrap();

    let outcome = bridge.run_new_download("http://x/a.bin", "1").await;

    assert_eq!(
        outcome,
        RegistryAction::NewDownload(NewDownload::new("http://x/b.bin"))
    );
}

#[tokio::test]
async fn test_completion_without_mutation_serializes_null() {
    let bridge = TestBridge::new();
    bridge
        .dispatcher
        .on("new-download", noop("test"))
        .await
        .unwrap();

    bridge.run_new_download("http://x/a.bin", "1").await;

    let command = bridge
        .host
        .commands()
        .into_iter()
        .find(|c| matches!(c, HostCommand::EventJobCompleted(_)))
        .unwrap();
    let wire = serde_json::to_value(&command).unwrap();
    assert_eq!(wire["payload"]["muted_action"], serde_json::Value::Null);
}

#[tokio::test]
async fn test_mutation_does_not_leak_into_next_delivery() {
    let bridge = TestBridge::new();
    let handler = ClosureHandler::arc("first-only", |registration, action| async move {
        if let RegistryAction::NewDownload(download) = action {
            if download.url.ends_with("a.bin") {
                registration.mutate(&download.with_url("http://x/c.bin"));
            }
        }
        AppResult::Ok(())
    });
    bridge.dispatcher.on("new-download", handler).await.unwrap();

    let first = bridge.run_new_download("http://x/a.bin", "1").await;
    let second = bridge.run_new_download("http://x/b.bin", "2").await;

    assert_eq!(
        first,
        RegistryAction::NewDownload(NewDownload::new("http://x/c.bin"))
    );
    assert_eq!(
        second,
        RegistryAction::NewDownload(NewDownload::new("http://x/b.bin"))
    );
}

#[tokio::test]
async fn test_registrations_chain_mutations_in_order() {
    let bridge = TestBridge::new();
    let first = ClosureHandler::arc("first", |registration, _| async move {
        registration.mutate(&NewDownload::new("http://x/first.bin"));
        AppResult::Ok(())
    });
    let second = ClosureHandler::arc("second", |registration, _| async move {
        registration.mutate(&NewDownload::new("http://x/second.bin"));
        AppResult::Ok(())
    });
    bridge.dispatcher.on("new-download", first).await.unwrap();
    bridge.dispatcher.on("new-download", second).await.unwrap();

    let outcome = bridge.run_new_download("http://x/a.bin", "1").await;

    assert_eq!(bridge.host.completions().len(), 2);
    assert_eq!(
        outcome,
        RegistryAction::NewDownload(NewDownload::new("http://x/second.bin"))
    );
}

#[tokio::test]
async fn test_children_unregistered_before_completion() {
    let bridge = TestBridge::new();
    let child_ids = Arc::new(Mutex::new(Vec::<String>::new()));

    let ids = child_ids.clone();
    let handler = ClosureHandler::arc("parent", move |registration, _| {
        let ids = ids.clone();
        async move {
            let child = registration
                .on("pause-download", helpers::noop("child"))
                .await?;
            assert_eq!(registration.child_count(), 1);
            assert!(child.registration().parent().is_some());
            ids.lock().unwrap().push(child.id().to_string());
            AppResult::Ok(())
        }
    });
    let parent = bridge.dispatcher.on("new-download", handler).await.unwrap();

    bridge.run_new_download("http://x/a.bin", "1").await;

    let child_id = child_ids.lock().unwrap()[0].clone();
    let commands = bridge.host.commands();
    let unregistered = commands
        .iter()
        .position(|c| matches!(c, HostCommand::UnRegisterEvent(r) if r.event_id == child_id))
        .expect("child was never unregistered");
    let completed = commands
        .iter()
        .position(|c| matches!(c, HostCommand::EventJobCompleted(_)))
        .unwrap();

    assert!(unregistered < completed);
    assert_eq!(bridge.host.unregister_count(&child_id), 1);
    assert_eq!(parent.registration().child_count(), 0);
    assert!(parent.registration().is_active());
    // Children are scoped to the invocation, never to the dispatcher.
    assert_eq!(bridge.dispatcher.registration_count().await, 1);
}

#[tokio::test]
async fn test_children_unregistered_after_handler_error() {
    let bridge = TestBridge::new();
    let child_ids = Arc::new(Mutex::new(Vec::<String>::new()));

    let ids = child_ids.clone();
    let handler = ClosureHandler::arc("parent", move |registration, _| {
        let ids = ids.clone();
        async move {
            let child = registration
                .on("pause-download", helpers::noop("child"))
                .await?;
            ids.lock().unwrap().push(child.id().to_string());
            AppResult::<()>::Err(AppError::internal("after child"))
        }
    });
    bridge.dispatcher.on("new-download", handler).await.unwrap();

    bridge.run_new_download("http://x/a.bin", "1").await;

    let child_id = child_ids.lock().unwrap()[0].clone();
    assert_eq!(bridge.host.unregister_count(&child_id), 1);
    assert!(!bridge.host.is_listening(&child_id));
}

#[tokio::test]
async fn test_parent_off_tears_down_children() {
    let bridge = TestBridge::new();
    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
    let release_rx = Arc::new(tokio::sync::Mutex::new(Some(release_rx)));
    let child_ids = Arc::new(Mutex::new(Vec::<String>::new()));

    let ids = child_ids.clone();
    let handler = ClosureHandler::arc("parent", move |registration, _| {
        let ids = ids.clone();
        let release_rx = release_rx.clone();
        async move {
            let child = registration
                .on("pause-download", helpers::noop("child"))
                .await?;
            ids.lock().unwrap().push(child.id().to_string());
            if let Some(rx) = release_rx.lock().await.take() {
                let _ = rx.await;
            }
            AppResult::Ok(())
        }
    });
    let parent = bridge.dispatcher.on("new-download", handler).await.unwrap();

    bridge
        .host
        .deliver(
            parent.id(),
            EventPayload {
                action: RegistryAction::NewDownload(NewDownload::new("http://x/a.bin")),
                key: EventKey::new("new-download", "1"),
            },
        )
        .unwrap();

    let child_id = {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            if let Some(id) = child_ids.lock().unwrap().first().cloned() {
                break id;
            }
            assert!(tokio::time::Instant::now() < deadline, "child never opened");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };

    parent.off().await;
    assert_eq!(bridge.host.unregister_count(&child_id), 1);
    assert_eq!(bridge.host.unregister_count(parent.id()), 1);

    // The running invocation is not aborted and still acknowledges.
    release_tx.send(()).unwrap();
    let completion = bridge
        .host
        .wait_for_completion(&EventKey::new("new-download", "1"), parent.id(), WAIT)
        .await
        .unwrap();
    assert!(completion.muted_action.is_none());
    assert_eq!(bridge.host.unregister_count(&child_id), 1);
}

#[tokio::test]
async fn test_child_on_outside_handler_is_rejected() {
    let bridge = TestBridge::new();
    let sub = bridge
        .dispatcher
        .on("new-download", noop("test"))
        .await
        .unwrap();

    let err = sub
        .registration()
        .on("pause-download", noop("child"))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Conflict);
}

#[cfg(debug_assertions)]
#[tokio::test]
#[should_panic(expected = "after its handler settled")]
async fn test_mutate_after_settle_panics_in_debug() {
    let bridge = TestBridge::new();
    let slot = Arc::new(Mutex::new(None));
    bridge
        .dispatcher
        .on("new-download", capturing(slot.clone()))
        .await
        .unwrap();

    bridge.run_new_download("http://x/a.bin", "1").await;

    let registration = slot.lock().unwrap().take().unwrap();
    registration.mutate(&json!({ "url": "http://x/late.bin" }));
}

#[cfg(not(debug_assertions))]
#[tokio::test]
async fn test_mutate_after_settle_is_ignored_in_release() {
    let bridge = TestBridge::new();
    let slot = Arc::new(Mutex::new(None));
    bridge
        .dispatcher
        .on("new-download", capturing(slot.clone()))
        .await
        .unwrap();

    bridge.run_new_download("http://x/a.bin", "1").await;

    let registration = slot.lock().unwrap().take().unwrap();
    registration.mutate(&json!({ "url": "http://x/late.bin" }));
    assert!(!registration.is_muted());

    let outcome = bridge.run_new_download("http://x/b.bin", "2").await;
    assert_eq!(
        outcome,
        RegistryAction::NewDownload(NewDownload::new("http://x/b.bin"))
    );
}

#[tokio::test(start_paused = true)]
async fn test_handler_timeout_still_acknowledges() {
    let bridge = TestBridge::with_config(BridgeConfig {
        handler_timeout_seconds: Some(1),
        ..BridgeConfig::default()
    });
    let handler = ClosureHandler::arc("slow", |registration, _| async move {
        registration.mutate(&NewDownload::new("http://x/never.bin"));
        tokio::time::sleep(Duration::from_secs(3600)).await;
        AppResult::Ok(())
    });
    bridge.dispatcher.on("new-download", handler).await.unwrap();

    let outcome = bridge.run_new_download("http://x/a.bin", "1").await;

    assert_eq!(
        outcome,
        RegistryAction::NewDownload(NewDownload::new("http://x/a.bin"))
    );
    assert_eq!(bridge.host.completions().len(), 1);
}

#[tokio::test]
async fn test_deliveries_to_one_registration_are_sequential() {
    let bridge = TestBridge::new();
    let running = Arc::new(Mutex::new(0usize));
    let peak = Arc::new(Mutex::new(0usize));

    let (r, p) = (running.clone(), peak.clone());
    let handler = ClosureHandler::arc("counting", move |_, _| {
        let (running, peak) = (r.clone(), p.clone());
        async move {
            {
                let mut n = running.lock().unwrap();
                *n += 1;
                let mut peak = peak.lock().unwrap();
                *peak = (*peak).max(*n);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            *running.lock().unwrap() -= 1;
            AppResult::Ok(())
        }
    });
    let sub = bridge.dispatcher.on("new-download", handler).await.unwrap();

    for id in ["1", "2", "3"] {
        bridge
            .host
            .deliver(
                sub.id(),
                EventPayload {
                    action: RegistryAction::NewDownload(NewDownload::new("http://x/a.bin")),
                    key: EventKey::new("new-download", id),
                },
            )
            .unwrap();
    }

    bridge
        .host
        .wait_for_completion(&EventKey::new("new-download", "3"), sub.id(), WAIT)
        .await
        .unwrap();

    assert_eq!(*peak.lock().unwrap(), 1);
    let ids: Vec<String> = bridge
        .host
        .completions()
        .into_iter()
        .map(|c| c.action_key.id)
        .collect();
    assert_eq!(ids, vec!["1", "2", "3"]);
}
