//! Token authentication for corral.
//!
//! Hosts and users authenticate with an `Authorization: Token <value>`
//! header. The value is a bare secret for hosts and `name:secret` for users.
//! Secrets are checked against the salted hashes stored on the records, in
//! constant time.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐
//! │   Gateway        │────▶│  Authenticator   │
//! │   (extractors)   │     │  (trait)         │
//! └──────────────────┘     └────────┬─────────┘
//!                                   │
//!                          ┌────────▼─────────┐
//!                          │StoreAuthenticator│
//!                          └────────┬─────────┘
//!                                   │
//!                          ┌────────▼─────────┐
//!                          │   Model store    │
//!                          │  (hashed keys)   │
//!                          └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use corral_auth::{token, Authenticator, StoreAuthenticator};
//! use corral_core::Name;
//! use corral_store::FsStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(FsStore::open("/tmp/corral-db")?);
//! let auth = StoreAuthenticator::new(store);
//!
//! let secret = token::host_secret(Some("Token 12345"))?;
//! auth.authenticate_host(&Name::parse("host_1")?, &secret).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod authenticator;
pub mod error;
pub mod token;

pub use authenticator::{Authenticator, Principal, StoreAuthenticator};
pub use error::{AuthError, Result};
pub use token::UserCredentials;

#[cfg(any(test, feature = "test-utils"))]
pub use authenticator::MockAuthenticator;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_error_status_codes() {
        assert_eq!(AuthError::MissingCredentials.http_status_code(), 401);
        assert_eq!(AuthError::MalformedHeader("x".into()).http_status_code(), 401);
        assert_eq!(AuthError::InvalidCredentials.http_status_code(), 401);
        assert_eq!(AuthError::Internal("x".into()).http_status_code(), 500);
    }

    #[test]
    fn auth_error_retriable() {
        assert!(AuthError::Internal("x".into()).is_retriable());
        assert!(!AuthError::InvalidCredentials.is_retriable());
        assert!(!AuthError::MissingCredentials.is_retriable());
    }
}
