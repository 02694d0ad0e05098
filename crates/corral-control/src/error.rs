//! Error types for the control plane.
//!
//! This module defines all errors that can occur while serving host,
//! container, request and user operations.

use corral_core::Name;
use corral_store::StoreError;
use thiserror::Error;

/// A result type using `ControlError`.
pub type Result<T> = std::result::Result<T, ControlError>;

/// Errors that can occur in control plane operations.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The requested host was not found.
    #[error("host not found: {0}")]
    HostNotFound(Name),

    /// The requested container was not found on the host.
    #[error("container not found: {host}/{container}")]
    ContainerNotFound {
        /// The host that was searched.
        host: Name,
        /// The missing container.
        container: Name,
    },

    /// The requested container request was not found.
    #[error("container request not found: {0}")]
    RequestNotFound(Name),

    /// The requested user was not found.
    #[error("user not found: {0}")]
    UserNotFound(Name),

    /// The request payload failed a policy check.
    #[error("validation error: {0}")]
    Validation(String),

    /// A record with the same name already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The caller is authenticated but not allowed to do this.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Storage layer error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Scheduler error.
    #[error("scheduler error: {0}")]
    Scheduler(#[from] corral_scheduler::SchedulerError),

    /// Authentication error.
    #[error("authentication error: {0}")]
    Auth(#[from] corral_auth::AuthError),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ControlError {
    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::HostNotFound(_)
            | Self::ContainerNotFound { .. }
            | Self::RequestNotFound(_)
            | Self::UserNotFound(_)
            | Self::Store(StoreError::NotFound { .. }) => 404,
            Self::Validation(_) | Self::Store(StoreError::Validation(_)) => 400,
            Self::Conflict(_) | Self::Store(StoreError::Conflict { .. }) => 409,
            Self::Forbidden(_) => 403,
            Self::Auth(e) => e.http_status_code(),
            Self::Scheduler(e) => e.http_status_code(),
            Self::Store(_) | Self::Internal(_) => 500,
        }
    }

    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        match self {
            Self::Store(StoreError::Io(_)) | Self::Internal(_) => true,
            Self::Scheduler(e) => e.is_retriable(),
            Self::Auth(e) => e.is_retriable(),
            _ => false,
        }
    }
}
