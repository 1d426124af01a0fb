//! Health check endpoint.

use crate::server::GatewayState;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always "ok" while the server is accepting requests.
    pub status: String,

    /// Gateway version.
    pub version: String,

    /// Connected sessions.
    pub clients: usize,

    /// Uptime in seconds.
    pub uptime_seconds: u64,
}

/// `GET /health`
pub async fn health(State(state): State<Arc<GatewayState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        clients: state.registry.len().await,
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}
