//! # ferrix-core
//!
//! Core crate for the Ferrix plugin bridge. Contains configuration schemas,
//! the typed registry actions exchanged with the download engine host,
//! and the unified error system.
//!
//! This crate has **no** internal dependencies on other Ferrix crates.

pub mod config;
pub mod error;
pub mod events;
pub mod result;

pub use error::AppError;
pub use events::RegistryAction;
pub use result::AppResult;
