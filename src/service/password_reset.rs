//! Password reset protocol.
//!
//! A reset token moves through `issued -> used`, or is superseded by a newer
//! request, or simply expires. Validation is read-only. Consumption goes
//! through [`PasswordResetTokenRepository::redeem`], whose conditional update
//! is the only thing that decides which of several concurrent callers wins.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};
use url::Url;

use super::normalize_email;
use crate::config::{TokenPolicy, TokenPurpose};
use crate::context::CallContext;
use crate::db::{
    NewPasswordResetToken, PasswordResetToken, PasswordResetTokenRepository, Redemption,
    StoreError, UserRepository,
};
use crate::error::AuthError;
use crate::jwt::{PasswordResetClaims, TokenAuthenticator, new_token_id};
use crate::mailer::Mailer;
use crate::password;

pub const RESET_EMAIL_SUBJECT: &str = "Password Reset Request";

#[derive(Clone)]
pub struct PasswordResetService {
    users: Arc<dyn UserRepository>,
    tokens: Arc<dyn PasswordResetTokenRepository>,
    mailer: Arc<dyn Mailer>,
    authenticator: TokenAuthenticator,
    policy: Arc<TokenPolicy>,
    reset_url: Url,
}

impl PasswordResetService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        tokens: Arc<dyn PasswordResetTokenRepository>,
        mailer: Arc<dyn Mailer>,
        authenticator: TokenAuthenticator,
        policy: Arc<TokenPolicy>,
        reset_url: Url,
    ) -> Self {
        Self {
            users,
            tokens,
            mailer,
            authenticator,
            policy,
            reset_url,
        }
    }

    /// Issue a reset token for `email` and mail the link.
    ///
    /// An unknown email succeeds without side effects. Earlier unused tokens
    /// of the user are marked used in the same unit that stores the new one.
    pub async fn request_reset(&self, ctx: &CallContext, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(AuthError::Validation("email is required"));
        }

        let Some(user) = ctx.guard(self.users.get_user_by_email(&email)).await?? else {
            debug!("Password reset requested for unknown email");
            return Ok(());
        };

        let settings = self.policy.settings(TokenPurpose::PasswordReset);
        let claims = PasswordResetClaims {
            user_id: user.id.clone(),
            email: user.email.clone(),
            jti: new_token_id(),
            registered: self
                .authenticator
                .registered_claims(&user.id, Utc::now(), settings.ttl()),
        };
        let token = self.authenticator.issue(&claims, settings.secret())?;

        ctx.guard(self.tokens.create_superseding(NewPasswordResetToken {
            user_id: user.id.clone(),
            jti: claims.jti.clone(),
            email: user.email.clone(),
            expires_at: claims.registered.expires_at(),
        }))
        .await??;

        let body = reset_email_body(&self.reset_link(&token), settings.ttl());
        ctx.guard(
            self.mailer
                .send_html(&[user.email.clone()], RESET_EMAIL_SUBJECT, &body),
        )
        .await?
        .inspect_err(|e| error!(user_id = %user.id, error = %e, "Failed to send reset email"))?;

        info!(user_id = %user.id, "Password reset requested");
        Ok(())
    }

    /// Check that `jti` names a token that is unused and unexpired.
    /// Changes nothing.
    pub async fn validate_token(&self, ctx: &CallContext, jti: &str) -> Result<(), AuthError> {
        let record = self.find(ctx, jti).await?;
        check_consumable(&record, Utc::now())
    }

    /// Set a new password using the token named by `jti`, consuming it.
    ///
    /// Of several concurrent calls with the same token exactly one succeeds;
    /// the rest fail with [`AuthError::TokenAlreadyUsed`]. A token that
    /// expires while the new password is being hashed is not consumed.
    pub async fn reset_password(
        &self,
        ctx: &CallContext,
        jti: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        if new_password.is_empty() {
            return Err(AuthError::Validation("new password is required"));
        }

        let record = self.find(ctx, jti).await?;
        check_consumable(&record, Utc::now())?;

        let password_hash = ctx.guard(password::hash_password(new_password)).await??;

        match ctx
            .guard(self.tokens.redeem(jti, &password_hash, Utc::now()))
            .await?
        {
            Ok(Redemption::Redeemed) => {
                info!(user_id = %record.user_id, "Password reset completed");
                Ok(())
            }
            Ok(Redemption::AlreadyUsed) => Err(AuthError::TokenAlreadyUsed),
            Ok(Redemption::Expired) => Err(AuthError::TokenExpired),
            Err(StoreError::NotFound) => {
                error!(user_id = %record.user_id, "Reset token owner disappeared");
                Err(AuthError::Internal("reset token owner not found".into()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find(&self, ctx: &CallContext, jti: &str) -> Result<PasswordResetToken, AuthError> {
        if jti.is_empty() {
            return Err(AuthError::Validation("token id is required"));
        }
        ctx.guard(self.tokens.get_token_by_jti(jti))
            .await??
            .ok_or(AuthError::TokenNotFound)
    }

    fn reset_link(&self, token: &str) -> Url {
        let mut link = self.reset_url.clone();
        link.query_pairs_mut().append_pair("token", token);
        link
    }
}

fn check_consumable(record: &PasswordResetToken, now: DateTime<Utc>) -> Result<(), AuthError> {
    if record.used {
        return Err(AuthError::TokenAlreadyUsed);
    }
    if record.is_expired_at(now) {
        return Err(AuthError::TokenExpired);
    }
    Ok(())
}

fn reset_email_body(link: &Url, ttl: Duration) -> String {
    format!(
        "<html><body>\
         <p>We received a request to reset your password.</p>\
         <p><a href=\"{link}\">Reset your password</a></p>\
         <p>This link expires in {}. If you did not request a reset, you can ignore this email.</p>\
         </body></html>",
        human_duration(ttl)
    )
}

fn human_duration(ttl: Duration) -> String {
    let secs = ttl.as_secs();
    let (n, unit) = if secs >= 3600 && secs % 3600 == 0 {
        (secs / 3600, "hour")
    } else if secs >= 60 && secs % 60 == 0 {
        (secs / 60, "minute")
    } else {
        (secs, "second")
    };
    if n == 1 {
        format!("1 {unit}")
    } else {
        format!("{n} {unit}s")
    }
}
