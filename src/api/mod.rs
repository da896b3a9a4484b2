mod auth;
mod error;
mod me;
mod password_reset;

use axum::{
    Json, Router,
    routing::{get, post},
};
use serde_json::{Value, json};

use crate::auth::GateConfig;
use crate::config::TokenPurpose;
use crate::service::{PasswordResetService, SessionService};

pub use error::ApiError;

pub const HEALTH_PATH: &str = "/health";
pub const LOGIN_PATH: &str = "/api/auth/login";
pub const REGISTER_PATH: &str = "/api/auth/register";
pub const REFRESH_PATH: &str = "/api/auth/refresh";
pub const RESET_REQUEST_PATH: &str = "/api/auth/password-reset/request";
pub const RESET_VALIDATE_PATH: &str = "/api/auth/password-reset/validate";
pub const RESET_CONFIRM_PATH: &str = "/api/auth/password-reset/confirm";
pub const ME_PATH: &str = "/api/me";

#[derive(Clone)]
pub struct ApiState {
    pub sessions: SessionService,
    pub resets: PasswordResetService,
}

/// Gate configuration for the routes below. `extra_exempt` is added to the
/// built-in exempt set.
pub fn gate_config<I, S>(extra_exempt: I) -> GateConfig
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let config = GateConfig::new()
        .exempt(HEALTH_PATH)
        .exempt(LOGIN_PATH)
        .exempt(REGISTER_PATH)
        .exempt(RESET_REQUEST_PATH)
        .require(REFRESH_PATH, TokenPurpose::Refresh)
        .require(RESET_VALIDATE_PATH, TokenPurpose::PasswordReset)
        .require(RESET_CONFIRM_PATH, TokenPurpose::PasswordReset)
        .require(ME_PATH, TokenPurpose::Access);

    extra_exempt
        .into_iter()
        .fold(config, |config, method| config.exempt(method))
}

/// Create the API router. The gate is layered on by the caller.
pub fn create_api_router(state: ApiState) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(health))
        .route(LOGIN_PATH, post(auth::login))
        .route(REGISTER_PATH, post(auth::register))
        .route(REFRESH_PATH, post(auth::refresh))
        .route(RESET_REQUEST_PATH, post(password_reset::request))
        .route(RESET_VALIDATE_PATH, get(password_reset::validate))
        .route(RESET_CONFIRM_PATH, post(password_reset::confirm))
        .route(ME_PATH, get(me::profile))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
