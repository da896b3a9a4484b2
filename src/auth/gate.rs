//! Request-authorization gate.
//!
//! Runs in front of every route. Each call gets a [`CallContext`]; calls that
//! are not exempt must carry `Authorization: Bearer <token>`, verified with
//! the secret of the purpose configured for the called method. Verified claims
//! are attached to the request extensions as [`VerifiedClaims`], the only
//! place handlers read identity from.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::{HeaderValue, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use super::bearer::parse_bearer;
use super::errors::GateError;
use crate::config::{TokenPolicy, TokenPurpose};
use crate::context::CallContext;
use crate::jwt::{PasswordResetClaims, SessionClaims, TokenAuthenticator};

/// Exempt methods and the token purpose each protected method expects.
/// Methods with no explicit purpose require an access token.
#[derive(Debug, Clone, Default)]
pub struct GateConfig {
    exempt: HashSet<String>,
    purposes: HashMap<String, TokenPurpose>,
}

impl GateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exempt(mut self, method: impl Into<String>) -> Self {
        self.exempt.insert(method.into());
        self
    }

    pub fn require(mut self, method: impl Into<String>, purpose: TokenPurpose) -> Self {
        self.purposes.insert(method.into(), purpose);
        self
    }

    pub fn is_exempt(&self, method: &str) -> bool {
        self.exempt.contains(method)
    }

    pub fn purpose_for(&self, method: &str) -> TokenPurpose {
        self.purposes
            .get(method)
            .copied()
            .unwrap_or(TokenPurpose::Access)
    }
}

/// Claims the gate verified for the current call, tagged by purpose.
#[derive(Debug, Clone)]
pub enum VerifiedClaims {
    Access(SessionClaims),
    Refresh(SessionClaims),
    PasswordReset(PasswordResetClaims),
}

/// Raw token the claims were decoded from.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

#[derive(Clone)]
pub struct Gate {
    config: Arc<GateConfig>,
    authenticator: TokenAuthenticator,
    policy: Arc<TokenPolicy>,
    request_timeout: Option<Duration>,
}

impl Gate {
    pub fn new(
        config: GateConfig,
        authenticator: TokenAuthenticator,
        policy: Arc<TokenPolicy>,
        request_timeout: Option<Duration>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            authenticator,
            policy,
            request_timeout,
        }
    }

    /// Decide a single call. `Ok(None)` means the method is exempt.
    pub fn check(
        &self,
        method: &str,
        authorization: Option<&HeaderValue>,
    ) -> Result<Option<(VerifiedClaims, BearerToken)>, GateError> {
        if self.config.is_exempt(method) {
            return Ok(None);
        }

        let value = authorization.ok_or(GateError::MissingToken)?;
        let value = value.to_str().map_err(|_| GateError::MalformedHeader)?;
        let token = parse_bearer(value).ok_or(GateError::MalformedHeader)?;

        let purpose = self.config.purpose_for(method);
        let secret = self.policy.settings(purpose).secret();

        let claims = match purpose {
            TokenPurpose::Access => {
                VerifiedClaims::Access(self.authenticator.verify(token, secret)?)
            }
            TokenPurpose::Refresh => {
                VerifiedClaims::Refresh(self.authenticator.verify(token, secret)?)
            }
            TokenPurpose::PasswordReset => {
                VerifiedClaims::PasswordReset(self.authenticator.verify(token, secret)?)
            }
        };

        Ok(Some((claims, BearerToken(token.to_string()))))
    }

    fn call_context(&self) -> CallContext {
        match self.request_timeout {
            Some(timeout) => CallContext::with_timeout(timeout),
            None => CallContext::background(),
        }
    }
}

/// Middleware entry point, installed with `middleware::from_fn_with_state`.
pub async fn authorize(State(gate): State<Gate>, mut request: Request, next: Next) -> Response {
    let method = request.uri().path().to_string();

    match gate.check(&method, request.headers().get(header::AUTHORIZATION)) {
        Ok(Some((claims, token))) => {
            request.extensions_mut().insert(claims);
            request.extensions_mut().insert(token);
        }
        Ok(None) => {}
        Err(e) => {
            debug!(method = %method, reason = %e, "Call rejected by gate");
            return e.into_response();
        }
    }

    let ctx = gate.call_context();
    // Dropping the in-flight call cancels everything it started
    let _cancel_on_drop = ctx.cancellation_token().clone().drop_guard();
    request.extensions_mut().insert(ctx);

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::config::TokenSettings;
    use crate::jwt::{JwtError, new_token_id};

    const ACCESS: &[u8] = b"gate-access-secret-gate-access-secret";
    const REFRESH: &[u8] = b"gate-refresh-secret-gate-refresh-secret";
    const RESET: &[u8] = b"gate-reset-secret-gate-reset-secret-reset";

    fn gate() -> Gate {
        let policy = TokenPolicy::new(
            "sessiongate",
            TokenSettings::new(ACCESS, Duration::from_secs(60)),
            TokenSettings::new(REFRESH, Duration::from_secs(600)),
            TokenSettings::new(RESET, Duration::from_secs(60)),
        )
        .unwrap();
        let config = GateConfig::new()
            .exempt("/login")
            .require("/refresh", TokenPurpose::Refresh)
            .require("/reset", TokenPurpose::PasswordReset);

        Gate::new(config, authenticator(), Arc::new(policy), None)
    }

    fn authenticator() -> TokenAuthenticator {
        TokenAuthenticator::new("sessiongate", "sessiongate")
    }

    fn session_token(secret: &[u8]) -> String {
        let auth = authenticator();
        let claims = SessionClaims {
            user_id: "user-1".into(),
            session_id: "session-1".into(),
            jti: new_token_id(),
            registered: auth.registered_claims("user-1", Utc::now(), Duration::from_secs(60)),
        };
        auth.issue(&claims, secret).unwrap()
    }

    fn bearer(token: &str) -> HeaderValue {
        HeaderValue::from_str(&format!("Bearer {token}")).unwrap()
    }

    #[test]
    fn test_exempt_method_needs_no_header() {
        assert!(gate().check("/login", None).unwrap().is_none());
    }

    #[test]
    fn test_missing_or_malformed_header() {
        let gate = gate();
        assert!(matches!(
            gate.check("/me", None),
            Err(GateError::MissingToken)
        ));

        let basic = HeaderValue::from_static("Basic dXNlcjpwYXNz");
        assert!(matches!(
            gate.check("/me", Some(&basic)),
            Err(GateError::MalformedHeader)
        ));
    }

    #[test]
    fn test_access_token_accepted_by_default() {
        let token = session_token(ACCESS);
        let (claims, raw) = gate().check("/me", Some(&bearer(&token))).unwrap().unwrap();

        assert!(matches!(claims, VerifiedClaims::Access(c) if c.session_id == "session-1"));
        assert_eq!(raw.0, token);
    }

    #[test]
    fn test_secret_follows_method_purpose() {
        let gate = gate();
        let refresh = session_token(REFRESH);

        // A refresh token is useless where an access token is expected
        let result = gate.check("/me", Some(&bearer(&refresh)));
        assert!(matches!(
            result,
            Err(GateError::InvalidToken(JwtError::InvalidSignature))
        ));

        let (claims, _) = gate
            .check("/refresh", Some(&bearer(&refresh)))
            .unwrap()
            .unwrap();
        assert!(matches!(claims, VerifiedClaims::Refresh(_)));
    }

    #[test]
    fn test_reset_purpose_decodes_reset_claims() {
        let auth = authenticator();
        let claims = PasswordResetClaims {
            user_id: "user-1".into(),
            email: "alice@example.com".into(),
            jti: "jti-1".into(),
            registered: auth.registered_claims("user-1", Utc::now(), Duration::from_secs(60)),
        };
        let token = auth.issue(&claims, RESET).unwrap();

        let (verified, _) = gate()
            .check("/reset", Some(&bearer(&token)))
            .unwrap()
            .unwrap();
        assert!(matches!(verified, VerifiedClaims::PasswordReset(c) if c.jti == "jti-1"));
    }
}
