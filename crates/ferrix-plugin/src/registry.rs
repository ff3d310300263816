//! Plugin registry: stores loaded plugin instances and metadata.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use ferrix_core::{AppError, AppResult};

use crate::api::context::PluginContext;

/// Metadata about a loaded plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    /// Unique plugin identifier.
    pub id: String,
    /// Human-readable plugin name.
    pub name: String,
    /// Plugin version string.
    pub version: String,
    /// Plugin description.
    pub description: String,
    /// Event names this plugin intercepts.
    pub events: Vec<String>,
}

/// Trait that all plugins must implement.
#[async_trait::async_trait]
pub trait Plugin: Send + Sync + std::fmt::Debug {
    /// Returns plugin metadata.
    fn info(&self) -> PluginInfo;

    /// Called once when the plugin is loaded. Registrations are opened here.
    async fn on_load(&self, ctx: &PluginContext) -> AppResult<()>;

    /// Called when the plugin is unloaded. Registrations are closed here.
    async fn on_unload(&self) -> AppResult<()>;
}

/// Registry of all loaded plugins, in load order.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: RwLock<Vec<(PluginInfo, Arc<dyn Plugin>)>>,
}

impl PluginRegistry {
    /// Creates a new empty plugin registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a plugin.
    pub async fn register(&self, plugin: Arc<dyn Plugin>) -> AppResult<()> {
        let info = plugin.info();
        let mut plugins = self.plugins.write().await;

        if plugins.iter().any(|(existing, _)| existing.id == info.id) {
            return Err(AppError::conflict(format!(
                "Plugin '{}' is already registered",
                info.id
            )));
        }

        info!(plugin_id = %info.id, name = %info.name, version = %info.version, "Registering plugin");

        plugins.push((info, plugin));
        Ok(())
    }

    /// Unregisters a plugin by ID.
    pub async fn unregister(&self, plugin_id: &str) -> AppResult<Arc<dyn Plugin>> {
        let mut plugins = self.plugins.write().await;

        let index = plugins
            .iter()
            .position(|(info, _)| info.id == plugin_id)
            .ok_or_else(|| AppError::not_found(format!("Plugin '{plugin_id}' not found")))?;

        let (_, plugin) = plugins.remove(index);

        info!(plugin_id = %plugin_id, "Plugin unregistered");

        Ok(plugin)
    }

    /// Gets a plugin by ID.
    pub async fn get(&self, plugin_id: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins
            .read()
            .await
            .iter()
            .find(|(info, _)| info.id == plugin_id)
            .map(|(_, plugin)| Arc::clone(plugin))
    }

    /// Lists all registered plugin metadata in load order.
    pub async fn list(&self) -> Vec<PluginInfo> {
        self.plugins
            .read()
            .await
            .iter()
            .map(|(info, _)| info.clone())
            .collect()
    }

    /// Returns plugin count.
    pub async fn count(&self) -> usize {
        self.plugins.read().await.len()
    }

    /// Checks whether a plugin is registered.
    pub async fn contains(&self, plugin_id: &str) -> bool {
        self.plugins
            .read()
            .await
            .iter()
            .any(|(info, _)| info.id == plugin_id)
    }
}
