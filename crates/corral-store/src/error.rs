//! Error types for the storage layer.

use thiserror::Error;

/// A result type using `StoreError`.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested record was not found.
    #[error("{kind} not found: {name}")]
    NotFound {
        /// The entity kind.
        kind: &'static str,
        /// The record name.
        name: String,
    },

    /// A record with the same name already exists.
    #[error("{kind} already exists: {name}")]
    Conflict {
        /// The entity kind.
        kind: &'static str,
        /// The record name.
        name: String,
    },

    /// The supplied properties do not match the schema.
    #[error("validation error: {0}")]
    Validation(String),

    /// A filesystem operation failed.
    #[error("io error: {0}")]
    Io(String),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub(crate) fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub(crate) fn io(context: &str, err: &std::io::Error) -> Self {
        Self::Io(format!("{context}: {err}"))
    }

    /// Returns true if this error means the record does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
