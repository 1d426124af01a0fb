//! One-time tickets bridging HTTP login to the streaming endpoint.
//!
//! A ticket is issued after a successful login and presented once as the
//! `ticket` query parameter of the upgrade request. Tickets are single-use
//! and expire after a fixed retention window; a background sweep evicts
//! stale entries whether or not they were ever presented.

use chatrelay_core::id;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// An issued ticket.
#[derive(Debug, Clone)]
pub struct Ticket {
    /// Opaque key handed to the client.
    pub key: String,

    /// Identity the ticket authenticates, if bound.
    pub identity: Option<String>,

    issued_at: Instant,
}

impl Ticket {
    fn is_expired(&self, retention: Duration) -> bool {
        self.issued_at.elapsed() >= retention
    }
}

/// Why a ticket was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TicketRejected {
    #[error("unknown or already used ticket")]
    Unknown,

    #[error("ticket expired")]
    Expired,
}

/// Store of outstanding tickets.
///
/// Every operation, including the sweep, goes through the same mutex.
pub struct TicketVault {
    tickets: Mutex<HashMap<String, Ticket>>,
    retention: Duration,
}

impl TicketVault {
    /// Create an empty vault whose tickets live for `retention`.
    pub fn new(retention: Duration) -> Self {
        Self {
            tickets: Mutex::new(HashMap::new()),
            retention,
        }
    }

    /// Issue a fresh ticket, optionally bound to an identity.
    pub async fn issue(&self, identity: Option<String>) -> Ticket {
        let ticket = Ticket {
            key: id::uuid(),
            identity,
            issued_at: Instant::now(),
        };

        self.tickets
            .lock()
            .await
            .insert(ticket.key.clone(), ticket.clone());
        ticket
    }

    /// Attach an identity to an outstanding ticket. Returns false if the
    /// ticket is unknown or already consumed.
    pub async fn bind(&self, key: &str, identity: impl Into<String>) -> bool {
        let mut tickets = self.tickets.lock().await;
        match tickets.get_mut(key) {
            Some(ticket) => {
                ticket.identity = Some(identity.into());
                true
            }
            None => false,
        }
    }

    /// Consume a ticket, returning its bound identity.
    ///
    /// The entry is removed in the same critical section that checks it, so
    /// a key verifies successfully at most once. Expiry is checked here too,
    /// so an expired ticket is rejected even if the sweep has not run yet.
    pub async fn verify_and_consume(&self, key: &str) -> Result<Option<String>, TicketRejected> {
        let ticket = self
            .tickets
            .lock()
            .await
            .remove(key)
            .ok_or(TicketRejected::Unknown)?;

        if ticket.is_expired(self.retention) {
            return Err(TicketRejected::Expired);
        }
        Ok(ticket.identity)
    }

    /// Evict every expired ticket. Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        let mut tickets = self.tickets.lock().await;
        let before = tickets.len();
        tickets.retain(|_, ticket| !ticket.is_expired(self.retention));
        before - tickets.len()
    }

    /// Number of outstanding tickets.
    pub async fn len(&self) -> usize {
        self.tickets.lock().await.len()
    }

    /// Whether no tickets are outstanding.
    pub async fn is_empty(&self) -> bool {
        self.tickets.lock().await.is_empty()
    }

    /// Run [`sweep`](Self::sweep) every `interval` until `shutdown` is cancelled.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let vault = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let evicted = vault.sweep().await;
                        if evicted > 0 {
                            debug!(evicted, "swept expired tickets");
                        }
                    }
                }
            }

            info!("ticket sweeper stopped");
        })
    }
}
