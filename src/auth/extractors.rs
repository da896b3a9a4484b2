//! Axum extractors for the claims the gate attached.
//!
//! Each extractor only accepts claims of its own purpose. A handler mounted
//! on a route the gate checked for a different purpose gets a 401.

use axum::{extract::FromRequestParts, http::request::Parts};

use super::errors::GateError;
use super::gate::{BearerToken, VerifiedClaims};
use crate::jwt::{PasswordResetClaims, SessionClaims};

/// Claims of a verified access token.
#[derive(Debug, Clone)]
pub struct AccessAuth(pub SessionClaims);

/// Claims and raw value of a verified refresh token.
#[derive(Debug, Clone)]
pub struct RefreshAuth {
    pub claims: SessionClaims,
    pub token: String,
}

/// Claims of a verified password reset token.
#[derive(Debug, Clone)]
pub struct ResetAuth(pub PasswordResetClaims);

fn verified(parts: &Parts) -> Result<&VerifiedClaims, GateError> {
    parts
        .extensions
        .get::<VerifiedClaims>()
        .ok_or(GateError::MissingClaims)
}

impl<S> FromRequestParts<S> for AccessAuth
where
    S: Send + Sync,
{
    type Rejection = GateError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match verified(parts)? {
            VerifiedClaims::Access(claims) => Ok(AccessAuth(claims.clone())),
            _ => Err(GateError::MissingClaims),
        }
    }
}

impl<S> FromRequestParts<S> for RefreshAuth
where
    S: Send + Sync,
{
    type Rejection = GateError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let VerifiedClaims::Refresh(claims) = verified(parts)? else {
            return Err(GateError::MissingClaims);
        };
        let token = parts
            .extensions
            .get::<BearerToken>()
            .ok_or(GateError::MissingClaims)?;

        Ok(RefreshAuth {
            claims: claims.clone(),
            token: token.0.clone(),
        })
    }
}

impl<S> FromRequestParts<S> for ResetAuth
where
    S: Send + Sync,
{
    type Rejection = GateError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match verified(parts)? {
            VerifiedClaims::PasswordReset(claims) => Ok(ResetAuth(claims.clone())),
            _ => Err(GateError::MissingClaims),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::Request;
    use chrono::Utc;

    use super::*;
    use crate::jwt::TokenAuthenticator;

    fn session_claims() -> SessionClaims {
        SessionClaims {
            user_id: "user-1".into(),
            session_id: "session-1".into(),
            jti: "jti".into(),
            registered: TokenAuthenticator::new("a", "i").registered_claims(
                "user-1",
                Utc::now(),
                Duration::from_secs(60),
            ),
        }
    }

    fn parts_with(claims: Option<VerifiedClaims>) -> Parts {
        let mut request = Request::builder().body(()).unwrap();
        if let Some(claims) = claims {
            request.extensions_mut().insert(claims);
        }
        request.into_parts().0
    }

    #[tokio::test]
    async fn test_injected_claims_are_read() {
        let mut parts = parts_with(Some(VerifiedClaims::Access(session_claims())));
        let AccessAuth(claims) = AccessAuth::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(claims.user_id, "user-1");
    }

    #[tokio::test]
    async fn test_wrong_purpose_rejected() {
        let mut parts = parts_with(Some(VerifiedClaims::Access(session_claims())));
        let result = ResetAuth::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(GateError::MissingClaims)));
    }

    #[tokio::test]
    async fn test_refresh_needs_raw_token() {
        let mut parts = parts_with(Some(VerifiedClaims::Refresh(session_claims())));
        let result = RefreshAuth::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(GateError::MissingClaims)));

        parts.extensions.insert(BearerToken("raw".into()));
        let auth = RefreshAuth::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(auth.token, "raw");
    }

    #[tokio::test]
    async fn test_no_claims() {
        let mut parts = parts_with(None);
        let result = AccessAuth::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(GateError::MissingClaims)));
    }
}
