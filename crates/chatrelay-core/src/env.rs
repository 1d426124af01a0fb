//! Environment variable handling.

use std::env;

/// Get an environment variable, returning None if not set or empty.
pub fn get_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

/// Get an environment variable with a default value.
pub fn get_var_or(name: &str, default: &str) -> String {
    get_var(name).unwrap_or_else(|| default.to_string())
}

/// Get an environment variable as a u16 (e.g., for ports).
pub fn get_u16(name: &str) -> Option<u16> {
    get_var(name).and_then(|v| v.parse().ok())
}

/// Common environment variable names.
pub mod vars {
    /// chatrelay home directory override.
    pub const HOME: &str = "CHATRELAY_HOME";

    /// Config file override.
    pub const CONFIG: &str = "CHATRELAY_CONFIG";

    /// Gateway port override.
    pub const PORT: &str = "CHATRELAY_PORT";

    /// SQLite database path override.
    pub const DB: &str = "CHATRELAY_DB";

    /// Log filter, read before `RUST_LOG`.
    pub const LOG: &str = "CHATRELAY_LOG";
}
