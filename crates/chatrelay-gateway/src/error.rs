//! Gateway error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chatrelay_store::StoreError;
use thiserror::Error;
use tracing::{error, warn};

/// Errors that can occur in the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Bad credentials, a missing/expired/consumed ticket, or a disallowed origin.
    ///
    /// The detail is logged but never sent to the client.
    #[error("Authentication rejected: {0}")]
    AuthRejected(String),

    /// Missing required fields or a taken username.
    #[error("{0}")]
    Validation(String),

    /// Malformed request.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Connection limit reached.
    #[error("Server at capacity: {0} connections")]
    CapacityExceeded(usize),

    /// Identity store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// HTTP status reported to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::AuthRejected(_) => StatusCode::UNAUTHORIZED,
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Store(StoreError::DuplicateUser(_)) => StatusCode::BAD_REQUEST,
            Self::CapacityExceeded(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Store(_) | Self::Io(_) | Self::Json(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show to the client.
    pub fn public_message(&self) -> String {
        match self.status() {
            StatusCode::UNAUTHORIZED => "unauthorized".to_string(),
            StatusCode::SERVICE_UNAVAILABLE => "server is full, try again later".to_string(),
            StatusCode::INTERNAL_SERVER_ERROR => "internal server error".to_string(),
            _ => match self {
                Self::Store(e) => e.to_string(),
                other => other.to_string(),
            },
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), "{}", self);
        } else {
            warn!(status = status.as_u16(), "{}", self);
        }

        let body = Json(serde_json::json!({ "error": self.public_message() }));
        (status, body).into_response()
    }
}
