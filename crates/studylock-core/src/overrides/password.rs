//! Override credential hashing.
//!
//! Passwords are case-insensitive: the hash is
//! `sha256(lowercase(password) + salt)` in hex. A stored credential is
//! either `salt$hash` or a bare hash using the legacy fixed salt.

use sha2::{Digest, Sha256};

/// Salt for bare-hash credentials written by older installs.
pub const LEGACY_SALT: &str = "study_lock_salt_v1";

const SALT_BYTES: usize = 16;

pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.to_lowercase().as_bytes());
    hasher.update(salt.as_bytes());
    hex::encode(hasher.finalize())
}

/// Build a `salt$hash` credential with a fresh random salt.
///
/// # Errors
/// Returns an error if the OS random source is unavailable.
pub fn encode_credential(password: &str) -> Result<String, getrandom::Error> {
    let mut salt = [0u8; SALT_BYTES];
    getrandom::fill(&mut salt)?;
    let salt = hex::encode(salt);
    let hash = hash_password(password, &salt);
    Ok(format!("{salt}${hash}"))
}

/// Check `password` against a stored credential. An empty credential
/// matches nothing.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let stored = stored.trim();
    if stored.is_empty() {
        return false;
    }
    let (salt, expected) = stored.split_once('$').unwrap_or((LEGACY_SALT, stored));
    let actual = hash_password(password, salt);
    constant_time_eq(actual.as_bytes(), expected.to_ascii_lowercase().as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
