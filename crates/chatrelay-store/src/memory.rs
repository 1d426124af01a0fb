//! In-memory identity store.

use crate::password::{hash_password, verify_password};
use crate::{IdentityStore, Result, StoreError};
use async_trait::async_trait;
use chatrelay_core::{id, StoredMessage, UserRecord};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

struct UserRow {
    record: UserRecord,
    password_hash: String,
}

struct MessageRow {
    id: String,
    sender_id: String,
    content: String,
    timestamp: DateTime<Utc>,
}

/// Process-local store. Contents are lost on restart.
pub struct MemoryIdentityStore {
    /// Users keyed by username.
    users: RwLock<HashMap<String, UserRow>>,
    messages: RwLock<Vec<MessageRow>>,
}

impl Default for MemoryIdentityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIdentityStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            messages: RwLock::new(Vec::new()),
        }
    }

    /// Number of registered users.
    pub async fn user_count(&self) -> usize {
        self.users.read().await.len()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn register(&self, username: &str, password: &str, email: &str) -> Result<UserRecord> {
        let mut users = self.users.write().await;
        if users.contains_key(username) {
            return Err(StoreError::DuplicateUser(username.to_string()));
        }

        let record = UserRecord {
            id: id::uuid(),
            username: username.to_string(),
            email: email.to_string(),
        };
        users.insert(
            username.to_string(),
            UserRow {
                record: record.clone(),
                password_hash: hash_password(password),
            },
        );
        Ok(record)
    }

    async fn authenticate(&self, username: &str, password: &str) -> Result<Option<UserRecord>> {
        let users = self.users.read().await;
        Ok(users
            .get(username)
            .filter(|row| verify_password(password, &row.password_hash))
            .map(|row| row.record.clone()))
    }

    async fn user_id(&self, username: &str) -> Result<String> {
        let users = self.users.read().await;
        users
            .get(username)
            .map(|row| row.record.id.clone())
            .ok_or_else(|| StoreError::UnknownUser(username.to_string()))
    }

    async fn record(&self, username: &str, content: &str) -> Result<StoredMessage> {
        let sender_id = self.user_id(username).await?;
        let row = MessageRow {
            id: id::uuid(),
            sender_id,
            content: content.to_string(),
            timestamp: Utc::now(),
        };
        let stored = StoredMessage {
            id: row.id.clone(),
            content: row.content.clone(),
            username: username.to_string(),
            timestamp: row.timestamp,
        };
        self.messages.write().await.push(row);
        Ok(stored)
    }

    async fn history(&self) -> Result<Vec<StoredMessage>> {
        let users = self.users.read().await;
        let names: HashMap<&str, &str> = users
            .values()
            .map(|row| (row.record.id.as_str(), row.record.username.as_str()))
            .collect();

        let messages = self.messages.read().await;
        let mut history: Vec<StoredMessage> = messages
            .iter()
            .filter_map(|row| {
                // Messages whose sender no longer resolves are left out.
                names.get(row.sender_id.as_str()).map(|username| StoredMessage {
                    id: row.id.clone(),
                    content: row.content.clone(),
                    username: (*username).to_string(),
                    timestamp: row.timestamp,
                })
            })
            .collect();
        history.sort_by_key(|m| m.timestamp);
        Ok(history)
    }
}
