//! Convenience result type alias for Ferrix.

use crate::error::AppError;

/// A specialized `Result` type for Ferrix operations.
pub type AppResult<T> = Result<T, AppError>;
