//! HTTP endpoint handlers.

pub mod auth;
pub mod health;

pub use auth::{login, register, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};
pub use health::{health, HealthResponse};
