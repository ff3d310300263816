//! Root dispatcher: opens top-level registrations and sends raw actions.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use ferrix_core::config::BridgeConfig;
use ferrix_core::{AppResult, RegistryAction};

use super::handler::EventHandler;
use super::registration::EventRegistration;
use crate::host::HostBridge;
use crate::protocol::HostCommand;

type RegistrationSet = RwLock<HashMap<String, Arc<EventRegistration>>>;

/// Handle returned by `on`, used to unregister.
#[derive(Debug, Clone)]
pub struct Subscription {
    registration: Arc<EventRegistration>,
    root: Option<Weak<RegistrationSet>>,
}

impl Subscription {
    pub(crate) fn child(registration: Arc<EventRegistration>) -> Self {
        Self {
            registration,
            root: None,
        }
    }

    /// Registration id.
    pub fn id(&self) -> &str {
        self.registration.id()
    }

    /// Event name the registration intercepts.
    pub fn event_name(&self) -> &str {
        self.registration.event_name()
    }

    /// The underlying registration.
    pub fn registration(&self) -> &Arc<EventRegistration> {
        &self.registration
    }

    /// Unregisters the registration and its children. Idempotent.
    pub async fn off(&self) {
        self.registration.off().await;

        if let Some(root) = self.root.as_ref().and_then(Weak::upgrade) {
            root.write().await.remove(self.registration.id());
        }
    }
}

/// Process-wide entry point for plugins.
///
/// Created once at startup and shared through the plugin context.
#[derive(Debug)]
pub struct Dispatcher {
    host: Arc<dyn HostBridge>,
    config: BridgeConfig,
    registrations: Arc<RegistrationSet>,
}

impl Dispatcher {
    /// Creates a dispatcher bound to `host`.
    pub fn new(host: Arc<dyn HostBridge>, config: BridgeConfig) -> Self {
        Self {
            host,
            config,
            registrations: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Registers a top-level handler for `event_name`.
    pub async fn on(
        &self,
        event_name: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> AppResult<Subscription> {
        let registration = EventRegistration::create(
            event_name.into(),
            handler,
            None,
            Arc::clone(&self.host),
            self.config.handler_timeout(),
        )
        .await?;

        self.registrations
            .write()
            .await
            .insert(registration.id().to_string(), Arc::clone(&registration));

        Ok(Subscription {
            registration,
            root: Some(Arc::downgrade(&self.registrations)),
        })
    }

    /// Asks the host to run the action `event` with `payload`.
    ///
    /// Fire-and-forget: send failures are logged, never returned.
    pub async fn dispatch(&self, event: &str, payload: Value) {
        self.dispatch_action(RegistryAction::from_parts(event, payload))
            .await;
    }

    /// Asks the host to run `action`.
    pub async fn dispatch_action(&self, action: RegistryAction) {
        let event = action.event_name().to_string();

        match self.host.send(HostCommand::Dispatch(action)).await {
            Ok(()) => debug!(event = %event, "Action dispatched"),
            Err(e) => error!(event = %event, error = %e, "Failed to dispatch action"),
        }
    }

    /// Number of live top-level registrations.
    pub async fn registration_count(&self) -> usize {
        self.registrations.read().await.len()
    }

    /// Whether a top-level registration with `id` is live.
    pub async fn is_registered(&self, id: &str) -> bool {
        self.registrations.read().await.contains_key(id)
    }

    /// Unregisters every top-level registration.
    pub async fn shutdown(&self) {
        let drained: Vec<_> = self
            .registrations
            .write()
            .await
            .drain()
            .map(|(_, registration)| registration)
            .collect();

        let count = drained.len();
        for registration in drained {
            registration.off().await;
        }

        info!(count, "Dispatcher shut down");
    }

    /// The host this dispatcher talks to.
    pub fn host(&self) -> &Arc<dyn HostBridge> {
        &self.host
    }

    /// Bridge configuration in effect.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }
}
