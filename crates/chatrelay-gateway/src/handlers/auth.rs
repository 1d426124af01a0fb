//! Login and registration endpoints.

use crate::error::GatewayError;
use crate::server::GatewayState;
use crate::Result;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chatrelay_core::{SecretString, UserRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// `POST /login` body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: SecretString,
}

/// Successful login: a one-time ticket for `/ws`.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub ticket: String,
    pub username: String,
}

/// `POST /register` body.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: SecretString,

    #[serde(default)]
    pub email: String,
}

/// Successful registration. Never carries the credential.
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub success: bool,
    pub message: String,
    pub user: UserRecord,
}

fn parse_body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| GatewayError::BadRequest(e.body_text()))
}

/// `POST /login`
///
/// Bad username and bad password are indistinguishable to the caller. The
/// username is trimmed as on registration; the password is used as sent.
pub async fn login(
    State(state): State<Arc<GatewayState>>,
    payload: std::result::Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>> {
    let request = parse_body(payload)?;
    let username = request.username.trim();

    let user = state
        .store
        .authenticate(username, request.password.expose_secret())
        .await?
        .ok_or_else(|| {
            GatewayError::AuthRejected(format!("invalid credentials for '{}'", username))
        })?;

    let ticket = state.vault.issue(Some(user.username.clone())).await;
    info!(username = %user.username, "issued ticket");

    Ok(Json(LoginResponse {
        ticket: ticket.key,
        username: user.username,
    }))
}

/// `POST /register`
pub async fn register(
    State(state): State<Arc<GatewayState>>,
    payload: std::result::Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterResponse>)> {
    let request = parse_body(payload)?;

    let username = request.username.trim();
    let email = request.email.trim();
    if username.is_empty() || email.is_empty() || request.password.expose_secret().trim().is_empty() {
        return Err(GatewayError::Validation(
            "Username, password and email are required".to_string(),
        ));
    }

    let user = state
        .store
        .register(username, request.password.expose_secret(), email)
        .await?;
    info!(username = %user.username, "registered user");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            success: true,
            message: "User registered successfully".to_string(),
            user,
        }),
    ))
}
