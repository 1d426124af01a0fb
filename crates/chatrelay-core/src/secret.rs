//! Credential handling.

use serde::Deserialize;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A password as read from a request body.
///
/// Zeroed on drop and redacted in debug output. It implements `Deserialize`
/// only, so it cannot end up in a response.
#[derive(Default, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    /// The plaintext, for hashing or verification.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Compare two byte strings in time independent of where they differ.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Credentials {
        username: String,
        #[serde(default)]
        password: SecretString,
    }

    #[test]
    fn test_password_never_printed() {
        let creds: Credentials =
            serde_json::from_str(r#"{"username":"alice","password":"hunter2"}"#).unwrap();
        assert_eq!(creds.password.expose_secret(), "hunter2");

        let printed = format!("{:?}", creds);
        assert!(printed.contains("alice"));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn test_missing_password_is_empty() {
        let creds: Credentials = serde_json::from_str(r#"{"username":"alice"}"#).unwrap();
        assert!(creds.password.expose_secret().is_empty());
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"digest", b"digest"));
        assert!(!constant_time_eq(b"digest", b"digesT"));
        assert!(!constant_time_eq(b"digest", b"diges"));
    }
}
