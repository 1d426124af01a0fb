//! # chatrelay-core
//!
//! Core types, configuration, and utilities for chatrelay.
//!
//! This crate provides shared functionality used across all chatrelay crates:
//!
//! - **Configuration**: Loading, validation, and persistence of the config file
//! - **Types**: Wire and storage types for chat messages and users
//! - **Utilities**: Path resolution, ID generation, hashing, and environment handling

pub mod config;
pub mod env;
pub mod error;
pub mod id;
pub mod paths;
pub mod secret;
pub mod types;

// Re-exports for convenience
pub use config::Config;
pub use error::ConfigError;
pub use secret::SecretString;
pub use types::*;
