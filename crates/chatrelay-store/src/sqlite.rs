//! SQLite identity store.

use crate::password::{hash_password, verify_password};
use crate::{IdentityStore, Result, StoreError};
use async_trait::async_trait;
use chatrelay_core::{id, StoredMessage, UserRecord};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL,
        password_hash TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS messages (
        id TEXT PRIMARY KEY,
        sender_id TEXT NOT NULL REFERENCES users(id),
        content TEXT NOT NULL,
        timestamp TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages(timestamp)",
];

/// Store backed by a SQLite database.
///
/// Timestamps are written as fixed-width RFC 3339 strings so that ordering by
/// the text column is chronological.
pub struct SqliteIdentityStore {
    pool: SqlitePool,
}

impl SqliteIdentityStore {
    /// Open (creating if needed) the database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    /// Open a private in-memory database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // Every connection to :memory: is a separate database, so keep exactly one alive.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        for statement in SCHEMA {
            sqlx::query(*statement).execute(&pool).await?;
        }
        debug!("SQLite schema ready");
        Ok(Self { pool })
    }
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp '{}': {}", raw, e)))
}

#[async_trait]
impl IdentityStore for SqliteIdentityStore {
    async fn register(&self, username: &str, password: &str, email: &str) -> Result<UserRecord> {
        let record = UserRecord {
            id: id::uuid(),
            username: username.to_string(),
            email: email.to_string(),
        };

        // The UNIQUE constraint makes check-and-insert atomic.
        let inserted = sqlx::query(
            "INSERT INTO users (id, username, email, password_hash) VALUES (?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.username)
        .bind(&record.email)
        .bind(hash_password(password))
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(record),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::DuplicateUser(username.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn authenticate(&self, username: &str, password: &str) -> Result<Option<UserRecord>> {
        let row: Option<(String, String, String, String)> = sqlx::query_as(
            "SELECT id, username, email, password_hash FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row
            .filter(|(_, _, _, hash)| verify_password(password, hash))
            .map(|(id, username, email, _)| UserRecord {
                id,
                username,
                email,
            }))
    }

    async fn user_id(&self, username: &str) -> Result<String> {
        let row: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|(id,)| id)
            .ok_or_else(|| StoreError::UnknownUser(username.to_string()))
    }

    async fn record(&self, username: &str, content: &str) -> Result<StoredMessage> {
        let sender_id = self.user_id(username).await?;
        let message = StoredMessage {
            id: id::uuid(),
            content: content.to_string(),
            username: username.to_string(),
            timestamp: Utc::now(),
        };

        sqlx::query("INSERT INTO messages (id, sender_id, content, timestamp) VALUES (?, ?, ?, ?)")
            .bind(&message.id)
            .bind(&sender_id)
            .bind(&message.content)
            .bind(format_timestamp(message.timestamp))
            .execute(&self.pool)
            .await?;

        Ok(message)
    }

    async fn history(&self) -> Result<Vec<StoredMessage>> {
        let rows: Vec<(String, String, String, String)> = sqlx::query_as(
            "SELECT m.id, m.content, u.username, m.timestamp
             FROM messages m
             JOIN users u ON u.id = m.sender_id
             ORDER BY m.timestamp ASC, m.rowid ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, content, username, timestamp)| {
                Ok(StoredMessage {
                    id,
                    content,
                    username,
                    timestamp: parse_timestamp(&timestamp)?,
                })
            })
            .collect()
    }
}
