//! Identity and message history storage for chatrelay.
//!
//! This crate provides:
//! - The [`IdentityStore`] trait the gateway consumes
//! - An in-memory implementation for tests and throwaway rooms
//! - A SQLite implementation backed by sqlx

pub mod error;
pub mod memory;
pub mod password;
pub mod sqlite;

pub use error::StoreError;
pub use memory::MemoryIdentityStore;
pub use sqlite::SqliteIdentityStore;

use async_trait::async_trait;
use chatrelay_core::config::{Config, StoreKind};
use chatrelay_core::{StoredMessage, UserRecord};
use std::sync::Arc;
use tracing::info;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Users, credentials, and the room's message history.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Create a user. Fails with [`StoreError::DuplicateUser`] without
    /// touching existing data when the username is taken.
    async fn register(&self, username: &str, password: &str, email: &str) -> Result<UserRecord>;

    /// Check credentials, returning the user on success.
    async fn authenticate(&self, username: &str, password: &str) -> Result<Option<UserRecord>>;

    /// Resolve a username to its stable identifier.
    async fn user_id(&self, username: &str) -> Result<String>;

    /// Persist a message sent by `username`.
    async fn record(&self, username: &str, content: &str) -> Result<StoredMessage>;

    /// All retained messages, oldest first.
    async fn history(&self) -> Result<Vec<StoredMessage>>;
}

/// Open the store selected by the configuration.
pub async fn open(config: &Config) -> Result<Arc<dyn IdentityStore>> {
    match config.store.kind {
        StoreKind::Memory => {
            info!("Using in-memory identity store");
            Ok(Arc::new(MemoryIdentityStore::new()))
        }
        StoreKind::Sqlite => {
            let path = config
                .database_path()
                .map_err(|e| StoreError::Config(e.to_string()))?;
            info!("Using SQLite identity store at {}", path.display());
            Ok(Arc::new(SqliteIdentityStore::open(&path).await?))
        }
    }
}
