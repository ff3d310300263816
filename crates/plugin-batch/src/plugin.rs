//! Batch expansion plugin: registers the handler with the dispatcher.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;
use validator::Validate;

use ferrix_core::{AppError, AppResult};
use ferrix_core::config::ProberConfig;
use ferrix_core::events::names;
use ferrix_plugin::{Plugin, PluginContext, PluginInfo, Subscription};

use crate::handler::BatchExpansionHandler;
use crate::prober::Prober;

/// Plugin id used in the plugin registry.
pub const PLUGIN_ID: &str = "batch-expansion";

/// Expands `{1..10}`, `[1-10]` and `00*` style URLs into the list of
/// URLs that actually exist before a download is created.
#[derive(Debug)]
pub struct BatchExpansionPlugin {
    config: ProberConfig,
    subscription: Mutex<Option<Subscription>>,
}

impl BatchExpansionPlugin {
    /// Create a new batch expansion plugin
    pub fn new(config: ProberConfig) -> Self {
        Self {
            config,
            subscription: Mutex::new(None),
        }
    }
}

impl Default for BatchExpansionPlugin {
    fn default() -> Self {
        Self::new(ProberConfig::default())
    }
}

#[async_trait]
impl Plugin for BatchExpansionPlugin {
    fn info(&self) -> PluginInfo {
        ferrix_plugin::plugin_info!(
            id: PLUGIN_ID,
            name: "Batch Expansion",
            version: env!("CARGO_PKG_VERSION"),
            description: "Expands batch URL patterns into the URLs that exist",
            events: [names::NEW_DOWNLOAD]
        )
    }

    async fn on_load(&self, ctx: &PluginContext) -> AppResult<()> {
        self.config
            .validate()
            .map_err(|e| AppError::validation(format!("Invalid prober settings: {e}")))?;

        let mut slot = self.subscription.lock().await;
        if let Some(previous) = slot.take() {
            previous.off().await;
        }

        let prober = Prober::new(ctx.host(), self.config.clone());
        let handler = Arc::new(BatchExpansionHandler::new(prober));
        let subscription = ctx
            .dispatcher()
            .on(names::NEW_DOWNLOAD, handler)
            .await?;

        info!(
            event_id = %subscription.id(),
            concurrency = self.config.concurrency,
            "Batch expansion enabled"
        );

        *slot = Some(subscription);
        Ok(())
    }

    async fn on_unload(&self) -> AppResult<()> {
        if let Some(subscription) = self.subscription.lock().await.take() {
            subscription.off().await;
            info!("Batch expansion disabled");
        }
        Ok(())
    }
}
