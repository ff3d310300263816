//! Plugin context: the dispatcher and host services available to plugins.

use std::sync::Arc;

use ferrix_core::AppResult;

use crate::bridge::dispatcher::Dispatcher;
use crate::host::HostBridge;

/// Context passed to plugins on load.
///
/// Carries the process-wide dispatcher; plugins open their top-level
/// registrations through it and reach host services such as `head`.
#[derive(Debug, Clone)]
pub struct PluginContext {
    dispatcher: Arc<Dispatcher>,
}

impl PluginContext {
    /// Creates a context around `dispatcher`.
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// The shared dispatcher.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// The host the dispatcher talks to.
    pub fn host(&self) -> Arc<dyn HostBridge> {
        Arc::clone(self.dispatcher.host())
    }

    /// Asks the host whether `url` exists.
    pub async fn head(&self, url: &str) -> AppResult<bool> {
        self.dispatcher.host().head(url).await
    }
}
