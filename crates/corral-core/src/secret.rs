//! Salted secret hashing.
//!
//! API keys for hosts and users are never stored in plaintext. The stored
//! form is `blake3$<hex salt>$<hex digest>` where the digest is a BLAKE3
//! key derivation over the salt followed by the secret.

use thiserror::Error;
use uuid::Uuid;

/// Scheme tag prefixed to every stored hash.
pub const SCHEME: &str = "blake3";

const DERIVE_CONTEXT: &str = "corral 2024-06-01 api key hashing";

/// Errors that can occur when reading a stored hash.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecretError {
    /// The stored value is not in `scheme$salt$digest` form.
    #[error("malformed stored hash")]
    Malformed,

    /// The stored value uses an unknown scheme.
    #[error("unsupported hash scheme: {0}")]
    UnsupportedScheme(String),
}

/// Hash a plaintext secret with a fresh random salt.
#[must_use]
pub fn hash_secret(plain: &str) -> String {
    let salt = *Uuid::new_v4().as_bytes();
    let digest = derive(&salt, plain);
    format!("{SCHEME}${}${}", hex::encode(salt), digest.to_hex())
}

/// Check a plaintext secret against a stored hash.
///
/// The digest comparison is constant-time.
///
/// # Errors
///
/// Returns an error if `stored` is not a hash produced by [`hash_secret`].
pub fn verify_secret(plain: &str, stored: &str) -> Result<bool, SecretError> {
    let mut parts = stored.split('$');
    let (Some(scheme), Some(salt_hex), Some(digest_hex), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(SecretError::Malformed);
    };

    if scheme != SCHEME {
        return Err(SecretError::UnsupportedScheme(scheme.to_string()));
    }

    let salt = hex::decode(salt_hex).map_err(|_| SecretError::Malformed)?;
    let expected = blake3::Hash::from_hex(digest_hex).map_err(|_| SecretError::Malformed)?;

    // blake3::Hash implements PartialEq in constant time.
    Ok(derive(&salt, plain) == expected)
}

/// Returns true if `value` looks like a stored hash rather than plaintext.
#[must_use]
pub fn is_hashed(value: &str) -> bool {
    value
        .strip_prefix(SCHEME)
        .is_some_and(|rest| rest.starts_with('$') && rest.matches('$').count() == 2)
}

/// Generate a random 64 character hex secret suitable for an API key.
#[must_use]
pub fn generate_secret() -> String {
    format!(
        "{}{}",
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    )
}

fn derive(salt: &[u8], plain: &str) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new_derive_key(DERIVE_CONTEXT);
    hasher.update(salt);
    hasher.update(plain.as_bytes());
    hasher.finalize()
}
