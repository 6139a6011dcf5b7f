//! # Credential & Token Cryptography
//!
//! Argon2id password hashing, opaque token generation, and SHA-256 digests
//! for tokens stored at rest.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;

use super::errors::{AuthError, AuthResult};

/// Length of the random part of an opaque token in bytes
const TOKEN_RANDOM_BYTES: usize = 32;

/// Hash a plaintext password with Argon2id.
///
/// Output is a PHC-format string carrying its own salt and parameters.
pub fn hash_password(password: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Crypto(format!("password hashing failed: {}", e)))
}

/// Verify a plaintext password against a stored PHC hash.
///
/// Returns `Ok(false)` on mismatch; an error only for a malformed hash.
pub fn verify_password(password: &str, stored_hash: &str) -> AuthResult<bool> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| AuthError::Crypto(format!("stored hash is malformed: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Generate an opaque URL-safe token (32 random bytes, base64-encoded).
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_RANDOM_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// SHA-256 digest of a token, hex-encoded.
///
/// Single-purpose tokens are stored as digests; the raw value exists only
/// in the issuance response.
pub fn token_digest(token: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
