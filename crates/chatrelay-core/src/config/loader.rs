//! Configuration loading and persistence.

use super::{Config, StoreKind};
use crate::env;
use crate::error::ConfigError;
use crate::paths;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = paths::config_file()?;
        Self::load(&path)
    }

    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        debug!("Loading config from {}", path.display());
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        json5::from_str(content).map_err(|e| ConfigError::Json5(e.to_string()))
    }

    /// Load from `path` (or the default location), falling back to defaults
    /// when no file exists, then apply environment overrides.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        let loaded = match path {
            Some(path) => Self::load(path),
            None => Self::load_default(),
        };

        let mut config = match loaded {
            Ok(config) => config,
            Err(ConfigError::NotFound(_)) => Self::default(),
            Err(e) => return Err(e),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Honor `CHATRELAY_PORT` and `CHATRELAY_DB`.
    pub fn apply_env_overrides(&mut self) {
        match env::get_u16(env::vars::PORT) {
            Some(port) => self.gateway.port = port,
            None => {
                if let Some(raw) = env::get_var(env::vars::PORT) {
                    warn!("Ignoring invalid {}: {}", env::vars::PORT, raw);
                }
            }
        }
        if let Some(db) = env::get_var(env::vars::DB) {
            self.store.path = Some(PathBuf::from(db));
        }
    }

    /// Save configuration to a file path.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_json5()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write atomically
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &content)?;
        fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Serialize to JSON5 string.
    pub fn to_json5(&self) -> Result<String, ConfigError> {
        // json5 doesn't have a serializer, so we use serde_json with pretty print
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Resolved SQLite database path.
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.store.path {
            Some(path) => Ok(paths::expand_tilde(&path.to_string_lossy())),
            None => paths::database_file(),
        }
    }

    /// Validate the configuration, collecting all errors before returning.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.gateway.port == 0 {
            errors.push("Gateway port cannot be 0".to_string());
        }

        if self.gateway.max_connections == 0 {
            errors.push("Gateway max_connections must be greater than 0".to_string());
        }

        for origin in &self.gateway.allowed_origins {
            if !(origin.starts_with("http://") || origin.starts_with("https://")) {
                errors.push(format!(
                    "Allowed origin '{}' must start with http:// or https://",
                    origin
                ));
            }
        }

        // Pings are derived from pong_wait; below 10ms the 9/10 interval rounds to nothing useful.
        if self.keepalive.pong_wait_ms < 10 {
            errors.push(format!(
                "Keepalive pong_wait_ms must be at least 10, got {}",
                self.keepalive.pong_wait_ms
            ));
        }

        if self.tickets.retention_ms == 0 {
            errors.push("Ticket retention_ms must be greater than 0".to_string());
        }
        if self.tickets.sweep_interval_ms == 0 {
            errors.push("Ticket sweep_interval_ms must be greater than 0".to_string());
        }

        if self.session.outbound_capacity == 0 {
            errors.push("Session outbound_capacity must be greater than 0".to_string());
        }

        if self.store.kind == StoreKind::Memory && self.store.path.is_some() {
            errors.push("Store path is set but store kind is 'memory'".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors.join("; ")))
        }
    }
}

/// Configuration builder for creating configs programmatically.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new config builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the gateway port.
    pub fn port(mut self, port: u16) -> Self {
        self.config.gateway.port = port;
        self
    }

    /// Set the bind mode.
    pub fn bind(mut self, mode: super::BindMode) -> Self {
        self.config.gateway.bind = mode;
        self
    }

    /// Replace the origin allow-list.
    pub fn allowed_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.gateway.allowed_origins = origins.into_iter().map(Into::into).collect();
        self
    }

    /// Set the keepalive pong wait.
    pub fn pong_wait_ms(mut self, ms: u64) -> Self {
        self.config.keepalive.pong_wait_ms = ms;
        self
    }

    /// Set the ticket retention window.
    pub fn ticket_retention_ms(mut self, ms: u64) -> Self {
        self.config.tickets.retention_ms = ms;
        self
    }

    /// Set the store backend.
    pub fn store(mut self, kind: StoreKind) -> Self {
        self.config.store.kind = kind;
        self
    }

    /// Set the log level.
    pub fn log_level(mut self, level: super::LogLevel) -> Self {
        self.config.logging.level = level;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Config {
        self.config
    }
}
