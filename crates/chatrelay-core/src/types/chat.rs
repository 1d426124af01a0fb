//! Chat message types shared by the store and the gateway.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message as persisted by the identity store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Message identifier.
    pub id: String,

    /// Message text.
    pub content: String,

    /// Sender's username.
    pub username: String,

    /// When the message was recorded.
    pub timestamp: DateTime<Utc>,
}

/// The broadcast unit sent to every other participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub content: String,
    pub username: String,
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    /// Create an envelope stamped with the current time.
    pub fn new(content: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            username: username.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Discriminator value of [`HistoryPayload`].
pub const HISTORY_TYPE: &str = "history";

/// Retained history, sent once right after a connection is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPayload {
    #[serde(rename = "type")]
    pub kind: String,

    /// Messages, oldest first.
    pub messages: Vec<StoredMessage>,
}

impl HistoryPayload {
    /// Build a history payload; messages are ordered by timestamp regardless
    /// of the order the store returned them in.
    pub fn new(mut messages: Vec<StoredMessage>) -> Self {
        messages.sort_by_key(|m| m.timestamp);
        Self {
            kind: HISTORY_TYPE.to_string(),
            messages,
        }
    }
}
