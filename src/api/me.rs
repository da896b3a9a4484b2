use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ApiState;
use super::error::ApiError;
use crate::auth::AccessAuth;
use crate::context::CallContext;

#[derive(Serialize)]
pub struct IdentityInfo {
    pub provider: String,
    pub email: String,
    pub last_login_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct ProfileResponse {
    pub user_id: String,
    pub session_id: String,
    pub email: String,
    pub identities: Vec<IdentityInfo>,
}

pub async fn profile(
    State(state): State<ApiState>,
    ctx: CallContext,
    AccessAuth(claims): AccessAuth,
) -> Result<Json<ProfileResponse>, ApiError> {
    let profile = state.sessions.profile(&ctx, &claims).await?;

    Ok(Json(ProfileResponse {
        user_id: profile.user.id,
        session_id: profile.session_id,
        email: profile.user.email,
        identities: profile
            .identities
            .into_iter()
            .map(|i| IdentityInfo {
                provider: i.provider,
                email: i.email,
                last_login_at: i.last_login_at,
            })
            .collect(),
    }))
}
