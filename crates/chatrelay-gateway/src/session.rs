//! Per-connection session and its read/write pumps.
//!
//! Each accepted connection runs two tasks. The read pump owns the inbound
//! half of the socket: it relays chat text to the registry and enforces the
//! read deadline, which only a pong extends. The write pump owns the
//! outbound half: it drains the session's queue and sends a ping every
//! `ping_interval`. Whichever pump ends first removes the session from the
//! registry, which closes it and stops the other pump.

use crate::registry::ConnectionRegistry;
use axum::extract::ws::{close_code, CloseFrame, Message};
use chatrelay_core::config::KeepaliveConfig;
use chatrelay_core::{id, Envelope};
use chatrelay_store::IdentityStore;
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::error::Error as StdError;
use std::fmt::{Debug, Display};
use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::error::{Error as WsError, ProtocolError};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, error, warn};

/// A connected participant.
pub struct Session {
    id: String,
    identity: String,
    outbound: mpsc::Sender<Arc<str>>,
    closed: CancellationToken,
    closing: AtomicBool,
    dropped: AtomicU64,
}

/// Why a frame could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    /// The outbound queue is at capacity.
    Full,
    /// The session has been closed.
    Closed,
}

impl Session {
    /// Create a session for `identity` with an outbound queue of `capacity`.
    /// The receiver is handed to the write pump.
    pub fn new(identity: impl Into<String>, capacity: usize) -> (Arc<Self>, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity);
        let session = Self {
            id: id::uuid(),
            identity: identity.into(),
            outbound: tx,
            closed: CancellationToken::new(),
            closing: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        };
        (Arc::new(session), rx)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Authenticated username.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Queue a serialized frame without waiting. Success resets the drop
    /// count.
    pub fn enqueue(&self, frame: Arc<str>) -> Result<(), EnqueueError> {
        if self.is_closed() {
            return Err(EnqueueError::Closed);
        }
        self.outbound.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => EnqueueError::Full,
            TrySendError::Closed(_) => EnqueueError::Closed,
        })?;
        self.dropped.store(0, Ordering::Relaxed);
        Ok(())
    }

    /// Close the session. Only the first call has an effect; returns whether
    /// this call closed it.
    pub fn close(&self) -> bool {
        if self.closing.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.closed.cancel();
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the session is closed.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closed.cancelled()
    }

    /// Count a dropped outbound message, returning how many have been
    /// dropped in a row.
    pub fn record_drop(&self) -> u64 {
        self.dropped.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// How the read pump ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadExit {
    /// The peer sent a close frame with this code.
    Closed(Option<u16>),
    /// The stream ended without a close frame.
    StreamEnded,
    /// Reading failed.
    Transport(String),
    /// No pong arrived before the read deadline.
    KeepaliveTimeout,
    /// The session was closed elsewhere.
    Shutdown,
}

/// How the write pump ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteExit {
    /// Every sender of the outbound queue went away.
    QueueClosed,
    /// Writing a frame failed.
    Transport(String),
    /// The session was closed elsewhere.
    Shutdown,
}

/// Handles of a running session's pumps. Each resolves to `None` if its
/// pump panicked.
pub struct SessionTasks {
    pub read: JoinHandle<Option<ReadExit>>,
    pub write: JoinHandle<Option<WriteExit>>,
}

/// Spawn both pumps for an accepted session.
pub fn start<R, W, E>(
    reader: R,
    writer: W,
    outbound: mpsc::Receiver<Arc<str>>,
    session: Arc<Session>,
    registry: Arc<ConnectionRegistry>,
    store: Arc<dyn IdentityStore>,
    keepalive: &KeepaliveConfig,
) -> SessionTasks
where
    R: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
    E: StdError + Send + 'static,
    W: Sink<Message> + Unpin + Send + 'static,
    W::Error: Display + Send,
{
    let pong_wait = keepalive.pong_wait();
    let ping_interval = keepalive.ping_interval();

    let read = {
        let session = Arc::clone(&session);
        let registry = Arc::clone(&registry);
        let pump = {
            let session = Arc::clone(&session);
            let registry = Arc::clone(&registry);
            async move { read_pump(reader, &session, &registry, store.as_ref(), pong_wait).await }
        };
        tokio::spawn(supervise("read", session, registry, pump))
    };

    let write = {
        let pump = {
            let session = Arc::clone(&session);
            async move { write_pump(writer, outbound, &session, ping_interval).await }
        };
        tokio::spawn(supervise("write", session, registry, pump))
    };

    SessionTasks { read, write }
}

/// Run a pump to completion, then unregister the session no matter how the
/// pump ended.
async fn supervise<T, F>(
    pump: &'static str,
    session: Arc<Session>,
    registry: Arc<ConnectionRegistry>,
    future: F,
) -> Option<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Debug + Send + 'static,
{
    let outcome = match tokio::spawn(future).await {
        Ok(exit) => {
            debug!(session = %session.id(), pump, ?exit, "pump exited");
            Some(exit)
        }
        Err(e) => {
            error!(session = %session.id(), pump, "pump failed: {}", e);
            None
        }
    };

    registry.remove(session.id()).await;
    outcome
}

async fn read_pump<R, E>(
    mut reader: R,
    session: &Session,
    registry: &ConnectionRegistry,
    store: &dyn IdentityStore,
    pong_wait: Duration,
) -> ReadExit
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: StdError + 'static,
{
    let mut deadline = Instant::now() + pong_wait;

    loop {
        let next = tokio::select! {
            _ = session.closed() => return ReadExit::Shutdown,
            next = tokio::time::timeout_at(deadline, reader.next()) => next,
        };

        let frame = match next {
            Err(_) => {
                debug!(session = %session.id(), "read deadline elapsed");
                return ReadExit::KeepaliveTimeout;
            }
            Ok(None) => return ReadExit::StreamEnded,
            Ok(Some(Err(e))) => {
                if is_abrupt_disconnect(&e) {
                    debug!(session = %session.id(), "peer went away: {}", e);
                } else {
                    warn!(session = %session.id(), "read error: {}", e);
                }
                return ReadExit::Transport(e.to_string());
            }
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            Message::Text(text) => relay(session, registry, store, text).await,
            Message::Binary(bytes) => match String::from_utf8(bytes) {
                Ok(text) => relay(session, registry, store, text).await,
                Err(_) => debug!(session = %session.id(), "ignoring non-UTF-8 binary frame"),
            },
            Message::Pong(_) => deadline = Instant::now() + pong_wait,
            // The socket answers pings itself.
            Message::Ping(_) => {}
            Message::Close(frame) => {
                let code = frame.as_ref().map(|f| f.code);
                if !is_expected_close(code) {
                    warn!(session = %session.id(), code = ?code, "unexpected close");
                }
                return ReadExit::Closed(code);
            }
        }
    }
}

fn is_expected_close(code: Option<u16>) -> bool {
    matches!(
        code,
        Some(close_code::NORMAL) | Some(close_code::AWAY) | Some(close_code::ABNORMAL)
    )
}

/// Whether a read error only means the peer vanished without a close
/// handshake, the abnormal closure case.
fn is_abrupt_disconnect(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(err) = current {
        if let Some(ws) = err.downcast_ref::<WsError>() {
            match ws {
                WsError::ConnectionClosed
                | WsError::AlreadyClosed
                | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => return true,
                _ => {}
            }
        }
        if let Some(io) = err.downcast_ref::<io::Error>() {
            return matches!(
                io.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            );
        }
        current = err.source();
    }
    false
}

/// Persist an inbound message, then fan it out to everyone else. A store
/// failure is logged and the message is still relayed.
async fn relay(session: &Session, registry: &ConnectionRegistry, store: &dyn IdentityStore, text: String) {
    let envelope = match store.record(session.identity(), &text).await {
        Ok(stored) => Envelope {
            content: stored.content,
            username: stored.username,
            timestamp: stored.timestamp,
        },
        Err(e) => {
            warn!(session = %session.id(), "failed to persist message: {}", e);
            Envelope::new(text, session.identity())
        }
    };

    let delivered = registry.broadcast(&envelope, session.id()).await;
    debug!(session = %session.id(), delivered, "relayed message");
}

async fn write_pump<W>(
    mut writer: W,
    mut outbound: mpsc::Receiver<Arc<str>>,
    session: &Session,
    ping_interval: Duration,
) -> WriteExit
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    let mut ticker = tokio::time::interval_at(Instant::now() + ping_interval, ping_interval);

    loop {
        tokio::select! {
            biased;

            _ = session.closed() => {
                send_close(&mut writer).await;
                return WriteExit::Shutdown;
            }
            frame = outbound.recv() => match frame {
                Some(text) => {
                    if let Err(e) = writer.send(Message::Text(text.to_string())).await {
                        debug!(session = %session.id(), "write failed: {}", e);
                        return WriteExit::Transport(e.to_string());
                    }
                }
                None => {
                    send_close(&mut writer).await;
                    return WriteExit::QueueClosed;
                }
            },
            _ = ticker.tick() => {
                if let Err(e) = writer.send(Message::Ping(Vec::new())).await {
                    debug!(session = %session.id(), "ping failed: {}", e);
                    return WriteExit::Transport(e.to_string());
                }
            }
        }
    }
}

async fn send_close<W>(writer: &mut W)
where
    W: Sink<Message> + Unpin,
{
    let frame = CloseFrame {
        code: close_code::NORMAL,
        reason: "".into(),
    };
    // The peer may already be gone.
    let _ = writer.send(Message::Close(Some(frame))).await;
}
