//! Shared helpers for bridge integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use ferrix_core::config::BridgeConfig;
use ferrix_core::events::NewDownload;
use ferrix_core::{AppResult, RegistryAction};
use ferrix_plugin::{ClosureHandler, Dispatcher, EventHandler, EventRegistration, MemoryHost};

/// Upper bound for any single wait in these tests.
pub const WAIT: Duration = Duration::from_secs(5);

/// Test bridge: an in-memory host plus a dispatcher bound to it.
pub struct TestBridge {
    pub host: Arc<MemoryHost>,
    pub dispatcher: Arc<Dispatcher>,
}

impl TestBridge {
    /// Creates a bridge with no handler timeout.
    pub fn new() -> Self {
        Self::with_config(BridgeConfig::default())
    }

    /// Creates a bridge with the given bridge settings.
    pub fn with_config(config: BridgeConfig) -> Self {
        let host = Arc::new(MemoryHost::new());
        let dispatcher = Arc::new(Dispatcher::new(host.clone(), config));
        Self { host, dispatcher }
    }

    /// Runs a `new-download` for `url` through every registration.
    pub async fn run_new_download(&self, url: &str, action_id: &str) -> RegistryAction {
        self.host
            .run_event_job(
                RegistryAction::NewDownload(NewDownload::new(url)),
                action_id,
                WAIT,
            )
            .await
            .expect("event job did not complete")
    }
}

/// A handler that does nothing.
pub fn noop(name: &str) -> Arc<dyn EventHandler> {
    ClosureHandler::arc(name, |_, _| async { AppResult::Ok(()) })
}

/// Slot a handler can stash its registration into.
pub type RegistrationSlot = Arc<Mutex<Option<Arc<EventRegistration>>>>;

/// A handler that records the registration it was invoked with.
pub fn capturing(slot: RegistrationSlot) -> Arc<dyn EventHandler> {
    ClosureHandler::arc("capture", move |registration, _| {
        let slot = slot.clone();
        async move {
            *slot.lock().unwrap() = Some(registration);
            AppResult::Ok(())
        }
    })
}
