//! Salted password hashing.
//!
//! Hashes are stored as `salt$sha256(salt || password)`.

use chatrelay_core::id;
use chatrelay_core::secret::constant_time_eq;

/// Hash a password with a fresh random salt.
pub fn hash_password(password: &str) -> String {
    let salt = id::salt();
    let digest = id::sha256(&format!("{}{}", salt, password));
    format!("{}${}", salt, digest)
}

/// Check a password against a stored hash.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt, expected)) = stored.split_once('$') else {
        return false;
    };
    let digest = id::sha256(&format!("{}{}", salt, password));
    constant_time_eq(digest.as_bytes(), expected.as_bytes())
}
