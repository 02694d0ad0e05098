//! `Authorization: Token <value>` parsing.
//!
//! Hosts send a bare secret; users send `name:secret`.

use corral_core::Name;

use crate::error::{AuthError, Result};

/// The authorization scheme expected in the header.
pub const SCHEME: &str = "Token";

/// Credentials presented by a user.
#[derive(Clone, PartialEq, Eq)]
pub struct UserCredentials {
    /// The user name.
    pub name: Name,
    /// The plaintext API key.
    pub secret: String,
}

impl std::fmt::Debug for UserCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserCredentials")
            .field("name", &self.name)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Extract the token value from an `Authorization` header.
///
/// # Errors
///
/// Returns `AuthError::MissingCredentials` if there is no header and
/// `AuthError::MalformedHeader` if it does not use the `Token` scheme or
/// carries an empty value.
pub fn token_value(header: Option<&str>) -> Result<&str> {
    let header = header.ok_or(AuthError::MissingCredentials)?;
    let (scheme, value) = header
        .split_once(' ')
        .ok_or_else(|| AuthError::MalformedHeader(format!("expected '{SCHEME} <value>'")))?;
    if !scheme.eq_ignore_ascii_case(SCHEME) {
        return Err(AuthError::MalformedHeader(format!(
            "unsupported scheme '{scheme}'"
        )));
    }
    let value = value.trim();
    if value.is_empty() {
        return Err(AuthError::MalformedHeader("empty token".to_string()));
    }
    Ok(value)
}

/// Parse a host token: the whole value is the secret.
///
/// # Errors
///
/// See [`token_value`].
pub fn host_secret(header: Option<&str>) -> Result<String> {
    token_value(header).map(str::to_string)
}

/// Parse a user token of the form `name:secret`.
///
/// # Errors
///
/// See [`token_value`]; additionally returns `AuthError::MalformedHeader` if
/// the value has no `:` or the name is invalid.
pub fn user_credentials(header: Option<&str>) -> Result<UserCredentials> {
    let value = token_value(header)?;
    let (name, secret) = value
        .split_once(':')
        .ok_or_else(|| AuthError::MalformedHeader("expected 'name:secret'".to_string()))?;
    let name = Name::parse(name).map_err(|e| AuthError::MalformedHeader(e.to_string()))?;
    if secret.is_empty() {
        return Err(AuthError::MalformedHeader("empty secret".to_string()));
    }
    Ok(UserCredentials {
        name,
        secret: secret.to_string(),
    })
}
