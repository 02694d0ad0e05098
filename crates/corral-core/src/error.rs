//! Common error types for corral.
//!
//! This module provides shared error types that are used across multiple crates.

use thiserror::Error;

use crate::names::NameError;
use crate::secret::SecretError;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur throughout the corral system.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An invalid record name was provided.
    #[error("invalid name: {0}")]
    InvalidName(#[from] NameError),

    /// A stored secret could not be interpreted.
    #[error("secret error: {0}")]
    Secret(#[from] SecretError),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}
