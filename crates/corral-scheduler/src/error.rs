//! Error types for the scheduler crate.

use thiserror::Error;

/// Errors that can occur during scheduling operations.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] corral_store::StoreError),

    /// The blocking placement task failed to complete.
    #[error("Placement task failed: {0}")]
    Task(String),
}

impl SchedulerError {
    /// Check if this error is retriable.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::Task(_))
    }

    /// Get the HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::Store(corral_store::StoreError::NotFound { .. }) => 404,
            Self::Store(_) | Self::Task(_) => 500,
        }
    }
}

/// A specialized Result type for scheduler operations.
pub type Result<T> = std::result::Result<T, SchedulerError>;
