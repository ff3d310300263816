//! Plugin system configuration.

use serde::{Deserialize, Serialize};

/// Toggles for the compiled-in plugins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    /// Whether the batch URL expansion plugin is loaded at startup.
    pub batch_expansion: bool,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            batch_expansion: true,
        }
    }
}
