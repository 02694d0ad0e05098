//! Credential verification.
//!
//! This module provides the `Authenticator` trait and a store-backed
//! implementation that checks secrets against the salted hashes kept on
//! host and user records.

use std::sync::Arc;

use async_trait::async_trait;
use corral_core::{secret, Name};
use corral_store::{layout, Host, Store, StoreError, User};

use crate::error::{AuthError, Result};
use crate::token::UserCredentials;

/// An authenticated user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// User name.
    pub name: Name,
    /// Whether the user may submit work.
    pub approved: bool,
    /// Whether the user may administer the fleet.
    pub admin: bool,
}

impl From<User> for Principal {
    fn from(user: User) -> Self {
        Self {
            name: user.name,
            approved: user.approved,
            admin: user.admin,
        }
    }
}

/// Trait for verifying host and user credentials.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Verify a host's secret.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the host is unknown or the
    /// secret does not match.
    async fn authenticate_host(&self, host: &Name, secret: &str) -> Result<()>;

    /// Verify a user's credentials and return who they are.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the user is unknown or the
    /// secret does not match.
    async fn authenticate_user(&self, credentials: &UserCredentials) -> Result<Principal>;
}

/// Check a plaintext secret against a stored hash.
fn check_secret(plain: &str, stored: &str) -> Result<()> {
    if stored.is_empty() {
        return Err(AuthError::InvalidCredentials);
    }
    match secret::verify_secret(plain, stored) {
        Ok(true) => Ok(()),
        Ok(false) => Err(AuthError::InvalidCredentials),
        Err(e) => {
            tracing::warn!(error = %e, "Stored API key hash is unreadable");
            Err(AuthError::InvalidCredentials)
        }
    }
}

fn map_store_error(err: StoreError) -> AuthError {
    if err.is_not_found() {
        AuthError::InvalidCredentials
    } else {
        AuthError::Internal(err.to_string())
    }
}

/// Authenticator backed by the model store.
pub struct StoreAuthenticator<S: Store> {
    store: Arc<S>,
}

impl<S: Store> StoreAuthenticator<S> {
    /// Create a new authenticator over the given store.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: Store + 'static> Authenticator for StoreAuthenticator<S> {
    async fn authenticate_host(&self, host: &Name, secret: &str) -> Result<()> {
        let store = Arc::clone(&self.store);
        let name = host.clone();
        let record: Host = tokio::task::spawn_blocking(move || store.get(&layout::hosts(), &name))
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?
            .map_err(map_store_error)?;

        check_secret(secret, &record.api_key).inspect_err(|_| {
            tracing::info!(host = %host, "Rejected host credentials");
        })
    }

    async fn authenticate_user(&self, credentials: &UserCredentials) -> Result<Principal> {
        let store = Arc::clone(&self.store);
        let name = credentials.name.clone();
        let user: User = tokio::task::spawn_blocking(move || store.get(&layout::users(), &name))
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?
            .map_err(map_store_error)?;

        check_secret(&credentials.secret, &user.api_key).inspect_err(|_| {
            tracing::info!(user = %credentials.name, "Rejected user credentials");
        })?;
        Ok(Principal::from(user))
    }
}

/// A mock authenticator with fixed credentials, for testing.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Default)]
pub struct MockAuthenticator {
    hosts: parking_lot::Mutex<std::collections::HashMap<Name, String>>,
    users: parking_lot::Mutex<std::collections::HashMap<Name, (String, Principal)>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockAuthenticator {
    /// Create an empty mock that rejects everyone.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `secret` for `host`.
    pub fn add_host(&self, host: &Name, secret: &str) {
        self.hosts.lock().insert(host.clone(), secret.to_string());
    }

    /// Accept `secret` for the given user.
    pub fn add_user(&self, principal: Principal, secret: &str) {
        self.users
            .lock()
            .insert(principal.name.clone(), (secret.to_string(), principal));
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl Authenticator for MockAuthenticator {
    async fn authenticate_host(&self, host: &Name, secret: &str) -> Result<()> {
        match self.hosts.lock().get(host) {
            Some(expected) if expected == secret => Ok(()),
            _ => Err(AuthError::InvalidCredentials),
        }
    }

    async fn authenticate_user(&self, credentials: &UserCredentials) -> Result<Principal> {
        match self.users.lock().get(&credentials.name) {
            Some((expected, principal)) if *expected == credentials.secret => Ok(principal.clone()),
            _ => Err(AuthError::InvalidCredentials),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_store::FsStore;
    use serde_json::json;
    use tempfile::TempDir;

    fn name(s: &str) -> Name {
        Name::parse(s).unwrap()
    }

    fn store_with_records() -> (Arc<FsStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        let host = json!({
            "distro_id": "ubuntu", "distro_release": "14.12", "distro_codename": "TRSUY",
            "mem_total": 5, "cpu_total": 5, "cpu_type": "arm", "api_key": "12345"
        });
        store
            .create(&layout::hosts(), &name("host_1"), host.as_object().unwrap().clone())
            .unwrap();
        let user = json!({"nickname": "Alice", "approved": true, "api_key": "pw"});
        store
            .create(&layout::users(), &name("alice"), user.as_object().unwrap().clone())
            .unwrap();
        let keyless = json!({"distro_id": "d", "distro_release": "r", "distro_codename": "c",
            "mem_total": 1, "cpu_total": 1, "cpu_type": "x"});
        store
            .create(&layout::hosts(), &name("keyless"), keyless.as_object().unwrap().clone())
            .unwrap();
        (Arc::new(store), dir)
    }

    #[tokio::test]
    async fn host_secret_must_match() {
        let (store, _dir) = store_with_records();
        let auth = StoreAuthenticator::new(store);

        auth.authenticate_host(&name("host_1"), "12345").await.unwrap();
        assert!(matches!(
            auth.authenticate_host(&name("host_1"), "54321").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.authenticate_host(&name("ghost"), "12345").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.authenticate_host(&name("keyless"), "").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn user_credentials_resolve_principal() {
        let (store, _dir) = store_with_records();
        let auth = StoreAuthenticator::new(store);

        let principal = auth
            .authenticate_user(&UserCredentials {
                name: name("alice"),
                secret: "pw".into(),
            })
            .await
            .unwrap();
        assert!(principal.approved);
        assert!(!principal.admin);

        let wrong = auth
            .authenticate_user(&UserCredentials {
                name: name("alice"),
                secret: "nope".into(),
            })
            .await;
        assert!(matches!(wrong, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn mock_authenticator_accepts_registered() {
        let mock = MockAuthenticator::new();
        mock.add_host(&name("h"), "k");
        mock.authenticate_host(&name("h"), "k").await.unwrap();
        assert!(mock.authenticate_host(&name("h"), "x").await.is_err());

        mock.add_user(
            Principal {
                name: name("root"),
                approved: true,
                admin: true,
            },
            "pw",
        );
        let p = mock
            .authenticate_user(&UserCredentials {
                name: name("root"),
                secret: "pw".into(),
            })
            .await
            .unwrap();
        assert!(p.admin);
    }
}
