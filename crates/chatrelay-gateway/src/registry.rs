//! Registry of live connections and broadcast fan-out.

use crate::session::{EnqueueError, Session};
use chatrelay_core::Envelope;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, RwLock, Semaphore};
use tracing::{debug, error, info, warn};

/// Consecutive dropped broadcasts tolerated before a slow peer is disconnected.
pub const DEFAULT_MAX_DROPPED: u64 = 100;

/// Sessions admitted by a default registry.
pub const DEFAULT_MAX_SESSIONS: usize = 1024;

/// A reserved place in the registry.
///
/// Taken before an upgrade's ticket is consumed and held by the session for
/// as long as it is registered. Dropping an unused slot returns it.
#[must_use = "dropping a slot releases it"]
#[derive(Debug)]
pub struct Slot(OwnedSemaphorePermit);

/// The set of currently connected sessions.
///
/// A session is present from the moment it is accepted until the first of
/// its pumps terminates. Removal also closes the session, so a removed
/// session never receives another broadcast. Each registered session holds
/// a [`Slot`] until it is removed.
pub struct ConnectionRegistry {
    sessions: RwLock<HashMap<String, (Arc<Session>, Slot)>>,
    slots: Arc<Semaphore>,
    max_sessions: usize,
    max_dropped: u64,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SESSIONS, DEFAULT_MAX_DROPPED)
    }
}

impl ConnectionRegistry {
    /// Create an empty registry admitting at most `max_sessions`.
    pub fn new(max_sessions: usize, max_dropped: u64) -> Self {
        let max_sessions = max_sessions.min(Semaphore::MAX_PERMITS);
        Self {
            sessions: RwLock::new(HashMap::new()),
            slots: Arc::new(Semaphore::new(max_sessions)),
            max_sessions,
            max_dropped,
        }
    }

    /// Maximum number of sessions.
    pub fn capacity(&self) -> usize {
        self.max_sessions
    }

    /// Reserve room for one more session, or `None` when full.
    pub fn reserve(&self) -> Option<Slot> {
        Arc::clone(&self.slots).try_acquire_owned().ok().map(Slot)
    }

    /// Register an accepted session in a reserved slot.
    pub async fn add(&self, session: Arc<Session>, slot: Slot) {
        let id = session.id().to_string();
        let mut sessions = self.sessions.write().await;
        sessions.insert(id.clone(), (session, slot));
        info!(session = %id, total = sessions.len(), "session registered");
    }

    /// Remove and close a session, releasing its slot. Removing an absent
    /// session is a no-op; returns whether this call did the removal.
    pub async fn remove(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id);
        match removed {
            Some((session, _slot)) => {
                session.close();
                info!(session = %id, identity = %session.identity(), "session removed");
                true
            }
            None => false,
        }
    }

    /// Enqueue `envelope` for every session except `excluding`.
    ///
    /// Never blocks on a peer: a full queue drops the message for that peer,
    /// and a peer that drops `max_dropped` in a row is disconnected. Returns
    /// the number of sessions the message was queued for.
    pub async fn broadcast(&self, envelope: &Envelope, excluding: &str) -> usize {
        let payload: Arc<str> = match serde_json::to_string(envelope) {
            Ok(json) => json.into(),
            Err(e) => {
                error!("Failed to serialize envelope: {}", e);
                return 0;
            }
        };

        let peers: Vec<Arc<Session>> = {
            let sessions = self.sessions.read().await;
            sessions
                .values()
                .map(|(session, _)| session)
                .filter(|session| session.id() != excluding)
                .cloned()
                .collect()
        };

        let mut delivered = 0;
        let mut slow = Vec::new();

        for peer in peers {
            match peer.enqueue(Arc::clone(&payload)) {
                Ok(()) => delivered += 1,
                Err(EnqueueError::Full) => {
                    let dropped = peer.record_drop();
                    warn!(
                        session = %peer.id(),
                        dropped,
                        "outbound queue full, dropping message"
                    );
                    if dropped >= self.max_dropped {
                        slow.push(peer.id().to_string());
                    }
                }
                Err(EnqueueError::Closed) => {
                    debug!(session = %peer.id(), "skipping closed session");
                }
            }
        }

        for id in slow {
            warn!(session = %id, "disconnecting slow client");
            self.remove(&id).await;
        }

        delivered
    }

    /// Remove and close every session.
    pub async fn close_all(&self) {
        let drained: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.write().await;
            sessions.drain().map(|(_, (session, _))| session).collect()
        };

        for session in &drained {
            session.close();
        }
        if !drained.is_empty() {
            info!(count = drained.len(), "closed all sessions");
        }
    }

    /// Whether a session is registered.
    pub async fn contains(&self, id: &str) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    /// Number of registered sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no sessions are registered.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
