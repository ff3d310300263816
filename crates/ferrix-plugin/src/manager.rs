//! Plugin manager: lifecycle management for all plugins.

use std::sync::Arc;

use tracing::{error, info, warn};

use ferrix_core::{AppError, AppResult};

use crate::api::context::PluginContext;
use crate::bridge::dispatcher::Dispatcher;
use crate::registry::{Plugin, PluginInfo, PluginRegistry};

/// Manages the lifecycle of plugins: load and unload.
#[derive(Debug)]
pub struct PluginManager {
    /// Plugin registry.
    plugin_registry: Arc<PluginRegistry>,
    /// Context handed to every plugin.
    context: PluginContext,
}

impl PluginManager {
    /// Creates a plugin manager whose plugins share `dispatcher`.
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            plugin_registry: Arc::new(PluginRegistry::new()),
            context: PluginContext::new(dispatcher),
        }
    }

    /// Loads a compiled-in plugin.
    pub async fn load_plugin(&self, plugin: Arc<dyn Plugin>) -> AppResult<()> {
        let info = plugin.info();
        let plugin_id = info.id.clone();

        if self.plugin_registry.contains(&plugin_id).await {
            return Err(AppError::conflict(format!(
                "Plugin '{plugin_id}' is already loaded"
            )));
        }

        plugin.on_load(&self.context).await.map_err(|e| {
            error!(plugin_id = %plugin_id, error = %e, "Plugin load failed");
            AppError::plugin(format!("Plugin '{plugin_id}' load failed: {}", e.message))
        })?;

        if let Err(e) = self.plugin_registry.register(Arc::clone(&plugin)).await {
            if let Err(unload) = plugin.on_unload().await {
                warn!(plugin_id = %plugin_id, error = %unload, "Plugin unload returned error");
            }
            return Err(e);
        }

        info!(
            plugin_id = %plugin_id,
            name = %info.name,
            version = %info.version,
            events = info.events.len(),
            "Plugin loaded"
        );

        Ok(())
    }

    /// Unloads a plugin.
    pub async fn unload_plugin(&self, plugin_id: &str) -> AppResult<()> {
        let plugin = self.plugin_registry.unregister(plugin_id).await?;

        if let Err(e) = plugin.on_unload().await {
            warn!(
                plugin_id = %plugin_id,
                error = %e,
                "Plugin unload returned error"
            );
        }

        info!(plugin_id = %plugin_id, "Plugin unloaded");

        Ok(())
    }

    /// Unloads all plugins, most recently loaded first.
    pub async fn unload_all(&self) {
        let plugins = self.plugin_registry.list().await;

        for info in plugins.iter().rev() {
            if let Err(e) = self.unload_plugin(&info.id).await {
                error!(
                    plugin_id = %info.id,
                    error = %e,
                    "Error unloading plugin"
                );
            }
        }

        info!("All plugins unloaded");
    }

    /// Returns the shared dispatcher.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        self.context.dispatcher()
    }

    /// Returns the context handed to plugins.
    pub fn context(&self) -> &PluginContext {
        &self.context
    }

    /// Returns the plugin registry.
    pub fn plugin_registry(&self) -> &Arc<PluginRegistry> {
        &self.plugin_registry
    }

    /// Lists all loaded plugins.
    pub async fn list_plugins(&self) -> Vec<PluginInfo> {
        self.plugin_registry.list().await
    }
}
