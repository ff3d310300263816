//! Plugin API: context exposed to plugin code.

pub mod context;

pub use context::PluginContext;
