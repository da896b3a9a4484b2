//! Signed token issuance and verification.
//!
//! Every token is HS256-signed and must carry an expiry, the configured
//! issuer and the configured audience. The authenticator holds no secrets:
//! callers pass the secret matching the token's purpose on every call, so one
//! instance can be shared by all handlers.

use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind};
use rand::RngCore;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// The only algorithm tokens may be signed with.
pub const SIGNING_ALGORITHM: Algorithm = Algorithm::HS256;

/// 256 random bits, hex encoded.
pub fn new_token_id() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Registered claims shared by every token this service mints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredClaims {
    /// Issuer
    pub iss: String,
    /// Audience
    pub aud: String,
    /// Subject (user id)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Not before (Unix timestamp)
    pub nbf: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl RegisteredClaims {
    pub fn issued_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.iat, 0).unwrap_or_default()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_default()
    }
}

/// Claims carried by access and refresh tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub user_id: String,
    pub session_id: String,
    /// Makes every minted token distinct, even within the same second
    pub jti: String,
    #[serde(flatten)]
    pub registered: RegisteredClaims,
}

/// Claims carried by password reset tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordResetClaims {
    pub user_id: String,
    pub email: String,
    /// Random token id, the key of the persisted reset record
    pub jti: String,
    #[serde(flatten)]
    pub registered: RegisteredClaims,
}

/// Stateless signer/verifier bound to one issuer and audience.
#[derive(Debug, Clone)]
pub struct TokenAuthenticator {
    audience: String,
    issuer: String,
}

impl TokenAuthenticator {
    pub fn new(audience: impl Into<String>, issuer: impl Into<String>) -> Self {
        Self {
            audience: audience.into(),
            issuer: issuer.into(),
        }
    }

    /// Registered claims for a token issued at `issued_at` (truncated to whole
    /// seconds) and living for `ttl`.
    pub fn registered_claims(
        &self,
        subject: &str,
        issued_at: DateTime<Utc>,
        ttl: Duration,
    ) -> RegisteredClaims {
        let iat = issued_at.timestamp();
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);

        RegisteredClaims {
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            sub: subject.to_string(),
            iat,
            nbf: iat,
            exp: iat.saturating_add(ttl_secs),
        }
    }

    /// Sign `claims` with `secret`.
    pub fn issue<C: Serialize>(&self, claims: &C, secret: &[u8]) -> Result<String, JwtError> {
        jsonwebtoken::encode(
            &Header::new(SIGNING_ALGORITHM),
            claims,
            &EncodingKey::from_secret(secret),
        )
        .map_err(JwtError::Signing)
    }

    /// Verify signature, algorithm, time bounds, issuer and audience, then
    /// decode the claims. No other semantic checks are made.
    pub fn verify<C: DeserializeOwned>(&self, token: &str, secret: &[u8]) -> Result<C, JwtError> {
        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        validation.set_audience(&[&self.audience]);
        validation.set_issuer(&[&self.issuer]);

        jsonwebtoken::decode::<C>(token, &DecodingKey::from_secret(secret), &validation)
            .map(|data| data.claims)
            .map_err(JwtError::from_decode)
    }
}

/// Errors that can occur during token operations.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
    #[error("invalid token signature")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
    #[error("token is not yet valid")]
    NotYetValid,
    #[error("token audience mismatch")]
    AudienceMismatch,
    #[error("token issuer mismatch")]
    IssuerMismatch,
    #[error("token has no expiry")]
    MissingExpiry,
    #[error("malformed token: {0}")]
    Malformed(#[source] jsonwebtoken::errors::Error),
}

impl JwtError {
    fn from_decode(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            // A token signed with any other algorithm is treated exactly like
            // a forged one.
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => JwtError::InvalidSignature,
            ErrorKind::ExpiredSignature => JwtError::Expired,
            ErrorKind::ImmatureSignature => JwtError::NotYetValid,
            ErrorKind::InvalidAudience => JwtError::AudienceMismatch,
            ErrorKind::InvalidIssuer => JwtError::IssuerMismatch,
            ErrorKind::MissingRequiredClaim(claim) => match claim.as_str() {
                "exp" => JwtError::MissingExpiry,
                "aud" => JwtError::AudienceMismatch,
                "iss" => JwtError::IssuerMismatch,
                _ => JwtError::Malformed(err),
            },
            _ => JwtError::Malformed(err),
        }
    }
}
