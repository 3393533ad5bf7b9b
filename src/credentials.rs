//! Password hashing and session tokens.
//!
//! Stored hash format: `pbkdf2_sha256$<iterations>$<salt b64>$<hash b64>`.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

pub const PBKDF2_ITERATIONS: u32 = 600_000;
pub const HASH_LENGTH: usize = 32;
pub const SALT_LENGTH: usize = 16;

const ALGORITHM: &str = "pbkdf2_sha256";

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Unsupported password hash format")]
    UnsupportedFormat,

    #[error("Malformed password hash: {0}")]
    Malformed(String),
}

/// Generate a cryptographically random salt
pub fn generate_salt() -> [u8; SALT_LENGTH] {
    use rand::RngCore;
    let mut salt = [0u8; SALT_LENGTH];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

fn derive(password: &str, salt: &[u8], iterations: u32) -> [u8; HASH_LENGTH] {
    let mut out = [0u8; HASH_LENGTH];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut out);
    out
}

pub fn hash_password(password: &str) -> String {
    hash_password_with_iterations(password, PBKDF2_ITERATIONS)
}

pub fn hash_password_with_iterations(password: &str, iterations: u32) -> String {
    let salt = generate_salt();
    let hash = derive(password, &salt, iterations);
    format!(
        "{ALGORITHM}${iterations}${}${}",
        STANDARD.encode(salt),
        STANDARD.encode(hash)
    )
}

/// Well-formed hash that matches no password. Verifying against it costs the
/// same as a real check.
pub fn dummy_hash() -> String {
    dummy_hash_with_iterations(PBKDF2_ITERATIONS)
}

fn dummy_hash_with_iterations(iterations: u32) -> String {
    format!(
        "{ALGORITHM}${iterations}${}${}",
        STANDARD.encode([0u8; SALT_LENGTH]),
        STANDARD.encode([0u8; HASH_LENGTH])
    )
}

/// Check `password` against a stored hash in constant time.
pub fn verify_password(password: &str, stored: &str) -> Result<bool, CredentialError> {
    let mut parts = stored.split('$');
    let (Some(algorithm), Some(iterations), Some(salt), Some(expected), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return Err(CredentialError::Malformed("expected 4 fields".into()));
    };

    if algorithm != ALGORITHM {
        return Err(CredentialError::UnsupportedFormat);
    }

    let iterations: u32 = iterations
        .parse()
        .map_err(|_| CredentialError::Malformed(format!("iterations '{iterations}'")))?;
    if iterations == 0 {
        return Err(CredentialError::Malformed("zero iterations".into()));
    }
    let salt = STANDARD
        .decode(salt)
        .map_err(|e| CredentialError::Malformed(format!("salt: {e}")))?;
    let expected = STANDARD
        .decode(expected)
        .map_err(|e| CredentialError::Malformed(format!("hash: {e}")))?;
    if expected.len() != HASH_LENGTH {
        return Err(CredentialError::Malformed("hash length".into()));
    }

    let actual = derive(password, &salt, iterations);
    Ok(actual.as_slice().ct_eq(expected.as_slice()).into())
}

/// SHA-256 of a bearer token. Only this is stored.
pub fn hash_token(token: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().into()
}

/// Generate a random bearer token (URL-safe base64, 32 bytes of entropy).
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}
