//! Gate rejection type.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::jwt::JwtError;

/// Why the gate refused a call. Every variant answers 401 with the same
/// body, so callers cannot tell a bad signature from a missing header.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("missing authorization header")]
    MissingToken,
    #[error("malformed authorization header")]
    MalformedHeader,
    #[error("token rejected: {0}")]
    InvalidToken(#[from] JwtError),
    /// A handler asked for claims the gate did not attach
    #[error("no claims of the expected kind on this call")]
    MissingClaims,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "Not authenticated",
            }),
        )
            .into_response()
    }
}
