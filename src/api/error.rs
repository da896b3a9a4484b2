//! Protocol errors to HTTP responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::{error, warn};

use crate::error::{AuthError, ErrorKind};

/// nginx's "client closed request", for calls the caller abandoned.
const CLIENT_CLOSED_REQUEST: u16 = 499;

/// API error type with automatic response conversion.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    Conflict(String),
    PreconditionFailed(String),
    Gone(String),
    ClientClosed,
    Timeout,
    /// Detail is logged, never returned
    Internal,
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err.kind() {
            ErrorKind::Validation => ApiError::BadRequest(err.to_string()),
            ErrorKind::Unauthenticated => ApiError::Unauthorized(err.to_string()),
            ErrorKind::NotFound => ApiError::NotFound(err.to_string()),
            ErrorKind::Conflict => ApiError::Conflict(err.to_string()),
            ErrorKind::PreconditionFailed => ApiError::PreconditionFailed(err.to_string()),
            ErrorKind::Expired => ApiError::Gone(err.to_string()),
            ErrorKind::Cancelled => ApiError::ClientClosed,
            ErrorKind::DeadlineExceeded => {
                warn!("Request deadline exceeded");
                ApiError::Timeout
            }
            ErrorKind::Internal => {
                error!(error = %err, "Request failed");
                ApiError::Internal
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::PreconditionFailed(msg) => (StatusCode::PRECONDITION_FAILED, msg),
            ApiError::Gone(msg) => (StatusCode::GONE, msg),
            ApiError::ClientClosed => (
                StatusCode::from_u16(CLIENT_CLOSED_REQUEST).unwrap_or(StatusCode::BAD_REQUEST),
                "Request cancelled".to_string(),
            ),
            ApiError::Timeout => (
                StatusCode::GATEWAY_TIMEOUT,
                "Request timed out".to_string(),
            ),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal error".to_string(),
            ),
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Interrupted;
    use crate::db::StoreError;

    fn status(err: AuthError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status(AuthError::Validation("x")), StatusCode::BAD_REQUEST);
        assert_eq!(status(AuthError::InvalidCredentials), StatusCode::UNAUTHORIZED);
        assert_eq!(status(AuthError::TokenNotFound), StatusCode::NOT_FOUND);
        assert_eq!(status(AuthError::UserAlreadyExists), StatusCode::CONFLICT);
        assert_eq!(
            status(AuthError::TokenAlreadyUsed),
            StatusCode::PRECONDITION_FAILED
        );
        assert_eq!(status(AuthError::TokenExpired), StatusCode::GONE);
        assert_eq!(
            status(AuthError::Interrupted(Interrupted::Cancelled)).as_u16(),
            499
        );
        assert_eq!(
            status(AuthError::Interrupted(Interrupted::DeadlineExceeded)),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status(AuthError::Store(StoreError::NotFound)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_detail_not_leaked() {
        let err = ApiError::from(AuthError::Internal("sqlite is on fire".into()));
        assert!(matches!(err, ApiError::Internal));
    }
}
