//! Prelude for convenient imports.

pub use async_trait::async_trait;

pub use ferrix_core::{AppError, AppResult, RegistryAction};

pub use crate::api::context::PluginContext;
pub use crate::bridge::dispatcher::{Dispatcher, Subscription};
pub use crate::bridge::handler::{ClosureHandler, EventHandler, handler_fn};
pub use crate::bridge::registration::EventRegistration;
pub use crate::host::HostBridge;
pub use crate::registry::{Plugin, PluginInfo};

pub use crate::plugin_info;
