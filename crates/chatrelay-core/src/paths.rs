//! Path resolution utilities.

use crate::env;
use crate::error::ConfigError;
use std::path::PathBuf;

/// Get the chatrelay base directory (`~/.chatrelay`, or `CHATRELAY_HOME`).
pub fn base_dir() -> Result<PathBuf, ConfigError> {
    if let Some(home) = env::get_var(env::vars::HOME) {
        return Ok(expand_tilde(&home));
    }
    let home = dirs::home_dir().ok_or_else(|| {
        ConfigError::Validation("Could not determine home directory".to_string())
    })?;
    Ok(home.join(".chatrelay"))
}

/// Get the main config file path (`~/.chatrelay/chatrelay.json5`).
pub fn config_file() -> Result<PathBuf, ConfigError> {
    Ok(base_dir()?.join("chatrelay.json5"))
}

/// Get the default SQLite database path (`~/.chatrelay/chatrelay.db`).
pub fn database_file() -> Result<PathBuf, ConfigError> {
    Ok(base_dir()?.join("chatrelay.db"))
}

/// Expand tilde (~) in a path.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
