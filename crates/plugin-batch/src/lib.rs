//! Batch URL expansion plugin for Ferrix.
//!
//! Intercepts `new-download`, recognises batch notations in the URL,
//! probes which candidates exist and rewrites the download to the
//! newline-separated list of confirmed URLs.

pub mod handler;
pub mod pattern;
pub mod plugin;
pub mod prober;

pub use pattern::{BatchPattern, PatternKind};
pub use plugin::BatchExpansionPlugin;
pub use prober::{ProbeResult, Prober};
