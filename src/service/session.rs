use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{normalize_email, require_credentials};
use crate::config::{TokenPolicy, TokenPurpose};
use crate::context::CallContext;
use crate::db::{
    ClientMetadata, Identity, IdentityRepository, NewIdentity, NewSession, NewUser,
    PASSWORD_PROVIDER, SessionRepository, SessionTokens, StoreError, User, UserRepository,
};
use crate::error::AuthError;
use crate::jwt::{SessionClaims, TokenAuthenticator, new_token_id};
use crate::password;

/// Access and refresh tokens bound to one session.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub session_id: String,
    pub access_token: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_token_expires_at: DateTime<Utc>,
}

impl TokenPair {
    fn to_session_tokens(&self) -> SessionTokens {
        SessionTokens {
            access_token: self.access_token.clone(),
            access_token_expires_at: self.access_token_expires_at,
            refresh_token: self.refresh_token.clone(),
            refresh_token_expires_at: self.refresh_token_expires_at,
        }
    }
}

/// The caller's account as seen through a verified access token.
#[derive(Debug, Clone)]
pub struct Profile {
    pub user: User,
    pub session_id: String,
    pub identities: Vec<Identity>,
}

/// Login, registration and token rotation.
#[derive(Clone)]
pub struct SessionService {
    users: Arc<dyn UserRepository>,
    identities: Arc<dyn IdentityRepository>,
    sessions: Arc<dyn SessionRepository>,
    authenticator: TokenAuthenticator,
    policy: Arc<TokenPolicy>,
}

impl SessionService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        identities: Arc<dyn IdentityRepository>,
        sessions: Arc<dyn SessionRepository>,
        authenticator: TokenAuthenticator,
        policy: Arc<TokenPolicy>,
    ) -> Self {
        Self {
            users,
            identities,
            sessions,
            authenticator,
            policy,
        }
    }

    /// Check credentials and open a new session.
    ///
    /// An unknown email and a wrong password both fail with
    /// [`AuthError::InvalidCredentials`] after one argon2 verification.
    pub async fn login(
        &self,
        ctx: &CallContext,
        email: &str,
        password: &str,
        client: ClientMetadata,
    ) -> Result<TokenPair, AuthError> {
        let email = normalize_email(email);
        require_credentials(&email, password)?;

        let Some(user) = ctx.guard(self.users.get_user_by_email(&email)).await?? else {
            ctx.guard(password::verify_dummy(password)).await?;
            debug!("Login for unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        let valid = ctx
            .guard(password::verify_password(password, &user.password_hash))
            .await??;
        if !valid {
            debug!(user_id = %user.id, "Login with wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        ctx.guard(self.identities.update_last_login(&user.id))
            .await??;

        self.issue_session(ctx, &user.id, client).await
    }

    /// Create an account with a password identity and open its first session.
    pub async fn register(
        &self,
        ctx: &CallContext,
        email: &str,
        password: &str,
        client: ClientMetadata,
    ) -> Result<TokenPair, AuthError> {
        let email = normalize_email(email);
        require_credentials(&email, password)?;

        let password_hash = ctx.guard(password::hash_password(password)).await??;

        let user = match ctx
            .guard(self.users.create_user(NewUser {
                email: email.clone(),
                password_hash,
            }))
            .await?
        {
            Ok(user) => user,
            Err(StoreError::Duplicate) => return Err(AuthError::UserAlreadyExists),
            Err(e) => return Err(e.into()),
        };

        ctx.guard(self.identities.create_identity(NewIdentity {
            user_id: user.id.clone(),
            provider: PASSWORD_PROVIDER.to_string(),
            provider_id: email.clone(),
            email,
        }))
        .await??;

        info!(user_id = %user.id, "User registered");

        self.issue_session(ctx, &user.id, client).await
    }

    /// Create a session record, then mint and persist its first token pair.
    pub async fn issue_session(
        &self,
        ctx: &CallContext,
        user_id: &str,
        client: ClientMetadata,
    ) -> Result<TokenPair, AuthError> {
        // The tokens embed the session id, so the record comes first
        let session = ctx
            .guard(self.sessions.create_session(NewSession {
                user_id: user_id.to_string(),
                client,
            }))
            .await??;

        let pair = self.mint_pair(user_id, &session.id, Utc::now())?;

        ctx.guard(
            self.sessions
                .update_tokens(&session.id, pair.to_session_tokens()),
        )
        .await??;

        info!(user_id = %user_id, session_id = %session.id, "Session issued");
        Ok(pair)
    }

    /// Replace the session's token pair, given its current refresh token.
    ///
    /// Fails with [`AuthError::Unauthenticated`] when the presented token is
    /// no longer the session's current one, including when a concurrent
    /// rotation won.
    pub async fn refresh(
        &self,
        ctx: &CallContext,
        claims: &SessionClaims,
        refresh_token: &str,
    ) -> Result<TokenPair, AuthError> {
        let session = ctx
            .guard(self.sessions.get_session_by_id(&claims.session_id))
            .await??
            .ok_or(AuthError::Unauthenticated)?;

        if session.user_id != claims.user_id || session.refresh_token != refresh_token {
            warn!(session_id = %session.id, "Refresh with a superseded token");
            return Err(AuthError::Unauthenticated);
        }

        let pair = self.mint_pair(&session.user_id, &session.id, Utc::now())?;

        let rotated = ctx
            .guard(self.sessions.rotate_tokens(
                &session.id,
                refresh_token,
                pair.to_session_tokens(),
            ))
            .await??;
        if !rotated {
            warn!(session_id = %session.id, "Lost refresh rotation race");
            return Err(AuthError::Unauthenticated);
        }

        debug!(session_id = %session.id, "Session tokens rotated");
        Ok(pair)
    }

    /// Account details for the holder of a verified access token.
    pub async fn profile(
        &self,
        ctx: &CallContext,
        claims: &SessionClaims,
    ) -> Result<Profile, AuthError> {
        let user = ctx
            .guard(self.users.get_user_by_id(&claims.user_id))
            .await??
            .ok_or(AuthError::Unauthenticated)?;

        let identities = ctx
            .guard(self.identities.get_identities_by_user_id(&user.id))
            .await??;

        Ok(Profile {
            user,
            session_id: claims.session_id.clone(),
            identities,
        })
    }

    fn mint_pair(
        &self,
        user_id: &str,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, AuthError> {
        let (access_token, access_token_expires_at) =
            self.mint(TokenPurpose::Access, user_id, session_id, now)?;
        let (refresh_token, refresh_token_expires_at) =
            self.mint(TokenPurpose::Refresh, user_id, session_id, now)?;

        Ok(TokenPair {
            session_id: session_id.to_string(),
            access_token,
            access_token_expires_at,
            refresh_token,
            refresh_token_expires_at,
        })
    }

    fn mint(
        &self,
        purpose: TokenPurpose,
        user_id: &str,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(String, DateTime<Utc>), AuthError> {
        let settings = self.policy.settings(purpose);
        let claims = SessionClaims {
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            jti: new_token_id(),
            registered: self
                .authenticator
                .registered_claims(user_id, now, settings.ttl()),
        };
        let token = self.authenticator.issue(&claims, settings.secret())?;
        Ok((token, claims.registered.expires_at()))
    }
}
