//! # ferrix-plugin
//!
//! Plugin framework for Ferrix. Provides:
//!
//! - The host bridge protocol and the [`HostBridge`] transport seam
//! - Event registrations with request/acknowledge semantics and
//!   handler-side mutation of in-flight actions
//! - The process-wide [`Dispatcher`] owning top-level registrations
//! - Plugin lifecycle management (load, unload) with an injected context
//! - An in-memory host for tests (`mock` feature)

pub mod api;
pub mod bridge;
pub mod host;
mod macros;
pub mod manager;
pub mod prelude;
pub mod protocol;
pub mod registry;

pub use api::context::PluginContext;
pub use bridge::dispatcher::{Dispatcher, Subscription};
pub use bridge::handler::{ClosureHandler, EventHandler, handler_fn};
pub use bridge::registration::EventRegistration;
pub use host::HostBridge;
#[cfg(feature = "mock")]
pub use host::memory::MemoryHost;
pub use manager::PluginManager;
pub use protocol::{
    CommandReply, CompletionCommand, EventKey, EventPayload, HeadRequest, HostCommand,
    RegistrationCommand,
};
pub use registry::{Plugin, PluginInfo, PluginRegistry};
