//! Authentication error types.

use thiserror::Error;

/// A result type using `AuthError`.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors that can occur during authentication.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No `Authorization` header was supplied.
    #[error("authentication credentials were not provided")]
    MissingCredentials,

    /// The `Authorization` header is not in `Token <value>` form.
    #[error("malformed authorization header: {0}")]
    MalformedHeader(String),

    /// The principal is unknown or the secret does not match.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// An internal error occurred while checking credentials.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Returns `true` if retrying the same credentials might succeed.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::Internal(_))
    }

    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::MissingCredentials | Self::MalformedHeader(_) | Self::InvalidCredentials => 401,
            Self::Internal(_) => 500,
        }
    }
}
