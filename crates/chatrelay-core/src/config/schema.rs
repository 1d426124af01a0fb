//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main chatrelay configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Gateway settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Keepalive protocol settings.
    #[serde(default)]
    pub keepalive: KeepaliveConfig,

    /// Ticket vault settings.
    #[serde(default)]
    pub tickets: TicketConfig,

    /// Per-connection session settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Identity store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Bind mode.
    #[serde(default)]
    pub bind: BindMode,

    /// Port number.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Origins allowed to open the streaming endpoint and call the auth endpoints.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,

    /// Maximum concurrently connected sessions.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Directory of static assets served for unmatched routes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: BindMode::default(),
            port: default_port(),
            allowed_origins: default_allowed_origins(),
            max_connections: default_max_connections(),
            static_dir: None,
        }
    }
}

fn default_port() -> u16 {
    8080
}

fn default_allowed_origins() -> Vec<String> {
    [
        "http://localhost:8080",
        "https://localhost:8080",
        "http://localhost:8081",
        "https://localhost:8081",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_max_connections() -> usize {
    1024
}

/// Bind mode for the gateway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindMode {
    /// Bind to loopback only (127.0.0.1).
    #[default]
    Loopback,

    /// Bind to all interfaces.
    Lan,
}

impl std::str::FromStr for BindMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "loopback" => Ok(Self::Loopback),
            "lan" => Ok(Self::Lan),
            other => Err(format!("Invalid bind mode: {}", other)),
        }
    }
}

/// Keepalive configuration.
///
/// The gateway pings every `pong_wait * 9 / 10`, so a healthy peer always has
/// a pong in flight before its read deadline lapses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeepaliveConfig {
    /// How long a peer may stay silent before its read deadline lapses.
    #[serde(default = "default_pong_wait_ms")]
    pub pong_wait_ms: u64,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            pong_wait_ms: default_pong_wait_ms(),
        }
    }
}

impl KeepaliveConfig {
    /// Read deadline extension granted by every pong.
    pub fn pong_wait(&self) -> Duration {
        Duration::from_millis(self.pong_wait_ms)
    }

    /// Interval between outgoing pings.
    pub fn ping_interval(&self) -> Duration {
        self.pong_wait() * 9 / 10
    }
}

fn default_pong_wait_ms() -> u64 {
    10_000
}

/// Ticket vault configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketConfig {
    /// Lifetime of an issued ticket.
    #[serde(default = "default_retention_ms")]
    pub retention_ms: u64,

    /// Tick of the background sweep.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

impl Default for TicketConfig {
    fn default() -> Self {
        Self {
            retention_ms: default_retention_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

impl TicketConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_millis(self.retention_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

fn default_retention_ms() -> u64 {
    5_000
}

fn default_sweep_interval_ms() -> u64 {
    400
}

/// Session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Capacity of each session's outbound queue.
    #[serde(default = "default_outbound_capacity")]
    pub outbound_capacity: usize,

    /// Dropped broadcasts tolerated before a slow peer is disconnected.
    #[serde(default = "default_max_dropped_messages")]
    pub max_dropped_messages: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: default_outbound_capacity(),
            max_dropped_messages: default_max_dropped_messages(),
        }
    }
}

fn default_outbound_capacity() -> usize {
    256
}

fn default_max_dropped_messages() -> u64 {
    100
}

/// Identity store configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store backend.
    #[serde(default)]
    pub kind: StoreKind,

    /// SQLite database file (defaults to `~/.chatrelay/chatrelay.db`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Identity store backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Process-local store, lost on restart.
    Memory,

    /// SQLite file.
    #[default]
    Sqlite,
}

impl std::str::FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(format!("Invalid store kind: {}", other)),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default)]
    pub level: LogLevel,
}

/// Log level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}
