//! Handler traits for event registrations.

use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;

use ferrix_core::{AppResult, RegistryAction};

use super::registration::EventRegistration;

/// Handles actions delivered to a registration.
///
/// The handler receives the registration it is bound to, so it can call
/// [`EventRegistration::mutate`] or open child registrations with
/// [`EventRegistration::on`] for the duration of the invocation.
#[async_trait]
pub trait EventHandler: Send + Sync + std::fmt::Debug {
    /// Handles one delivered action.
    ///
    /// Returning an error is logged; the host is acknowledged either way.
    async fn handle(
        &self,
        registration: Arc<EventRegistration>,
        action: RegistryAction,
    ) -> AppResult<()>;
}

type HandlerFn =
    dyn Fn(Arc<EventRegistration>, RegistryAction) -> BoxFuture<'static, AppResult<()>> + Send + Sync;

/// A closure-based handler for quick handler creation.
pub struct ClosureHandler {
    /// Name used in logs.
    name: String,
    /// Handler function.
    handler: Arc<HandlerFn>,
}

impl std::fmt::Debug for ClosureHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClosureHandler")
            .field("name", &self.name)
            .field("handler", &"<closure>")
            .finish()
    }
}

impl ClosureHandler {
    /// Creates a new closure-based handler.
    pub fn new<F, Fut>(name: &str, handler: F) -> Self
    where
        F: Fn(Arc<EventRegistration>, RegistryAction) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = AppResult<()>> + Send + 'static,
    {
        Self {
            name: name.to_string(),
            handler: Arc::new(
                move |registration: Arc<EventRegistration>, action: RegistryAction| {
                    handler(registration, action).boxed()
                },
            ),
        }
    }

    /// Creates a closure-based handler ready to pass to `on`.
    pub fn arc<F, Fut>(name: &str, handler: F) -> Arc<dyn EventHandler>
    where
        F: Fn(Arc<EventRegistration>, RegistryAction) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = AppResult<()>> + Send + 'static,
    {
        Arc::new(Self::new(name, handler))
    }

    /// Returns the handler name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl EventHandler for ClosureHandler {
    async fn handle(
        &self,
        registration: Arc<EventRegistration>,
        action: RegistryAction,
    ) -> AppResult<()> {
        (self.handler)(registration, action).await
    }
}

/// Wraps `handler` as a shareable [`EventHandler`].
pub fn handler_fn<F, Fut>(name: &str, handler: F) -> Arc<dyn EventHandler>
where
    F: Fn(Arc<EventRegistration>, RegistryAction) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = AppResult<()>> + Send + 'static,
{
    ClosureHandler::arc(name, handler)
}
