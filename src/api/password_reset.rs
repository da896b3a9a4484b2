//! Password reset endpoints.
//!
//! The validate and confirm calls are authorized with the reset token itself;
//! the token id comes from the claims the gate verified.

use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};

use super::ApiState;
use super::error::ApiError;
use crate::auth::ResetAuth;
use crate::context::CallContext;

#[derive(Deserialize)]
pub struct ResetRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct ConfirmRequest {
    pub new_password: String,
}

/// Always 202 for a well-formed request, whether or not the account exists.
pub async fn request(
    State(state): State<ApiState>,
    ctx: CallContext,
    Json(req): Json<ResetRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    state.resets.request_reset(&ctx, &req.email).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({}))))
}

pub async fn validate(
    State(state): State<ApiState>,
    ctx: CallContext,
    ResetAuth(claims): ResetAuth,
) -> Result<Json<Value>, ApiError> {
    state.resets.validate_token(&ctx, &claims.jti).await?;
    Ok(Json(json!({})))
}

pub async fn confirm(
    State(state): State<ApiState>,
    ctx: CallContext,
    ResetAuth(claims): ResetAuth,
    Json(req): Json<ConfirmRequest>,
) -> Result<Json<Value>, ApiError> {
    state
        .resets
        .reset_password(&ctx, &claims.jti, &req.new_password)
        .await?;
    Ok(Json(json!({})))
}
