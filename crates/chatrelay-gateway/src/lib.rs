//! WebSocket chat gateway for chatrelay.
//!
//! This crate provides:
//! - One-time tickets bridging HTTP login to the streaming endpoint
//! - The registry of live connections and its broadcast fan-out
//! - Per-connection read/write pumps with ping/pong keepalive
//! - The axum server exposing `/login`, `/register`, `/ws` and `/health`

pub mod error;
pub mod handlers;
pub mod registry;
pub mod server;
pub mod session;
pub mod ticket;

pub use error::GatewayError;
pub use registry::{ConnectionRegistry, Slot};
pub use server::{Admission, Gateway, GatewayState};
pub use session::{ReadExit, Session, SessionTasks, WriteExit};
pub use ticket::{Ticket, TicketRejected, TicketVault};

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
