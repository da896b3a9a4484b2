//! Login, registration and token rotation endpoints.
//!
//! - POST `/api/auth/login` - Open a session with email and password
//! - POST `/api/auth/register` - Create an account and open its first session
//! - POST `/api/auth/refresh` - Exchange the refresh token for a new pair

use axum::{Json, extract::State, http::StatusCode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ApiState;
use super::error::ApiError;
use crate::auth::{ClientMeta, RefreshAuth};
use crate::context::CallContext;
use crate::service::TokenPair;

#[derive(Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_token_expires_at: DateTime<Utc>,
}

impl From<TokenPair> for TokenResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            access_token: pair.access_token,
            access_token_expires_at: pair.access_token_expires_at,
            refresh_token: pair.refresh_token,
            refresh_token_expires_at: pair.refresh_token_expires_at,
        }
    }
}

pub async fn login(
    State(state): State<ApiState>,
    ctx: CallContext,
    ClientMeta(client): ClientMeta,
    Json(req): Json<CredentialsRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let pair = state
        .sessions
        .login(&ctx, &req.email, &req.password, client)
        .await?;
    Ok(Json(pair.into()))
}

pub async fn register(
    State(state): State<ApiState>,
    ctx: CallContext,
    ClientMeta(client): ClientMeta,
    Json(req): Json<CredentialsRequest>,
) -> Result<(StatusCode, Json<TokenResponse>), ApiError> {
    let pair = state
        .sessions
        .register(&ctx, &req.email, &req.password, client)
        .await?;
    Ok((StatusCode::CREATED, Json(pair.into())))
}

pub async fn refresh(
    State(state): State<ApiState>,
    ctx: CallContext,
    auth: RefreshAuth,
) -> Result<Json<TokenResponse>, ApiError> {
    let pair = state
        .sessions
        .refresh(&ctx, &auth.claims, &auth.token)
        .await?;
    Ok(Json(pair.into()))
}
