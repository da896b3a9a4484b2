//! Store capabilities the protocols depend on.
//!
//! Each trait has a SQLite implementation ([`crate::db::Database`]) and an
//! in-memory one ([`crate::db::MemoryStore`]).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::models::{
    Identity, NewIdentity, NewPasswordResetToken, NewSession, NewUser, PasswordResetToken,
    Session, SessionTokens, User, UserUpdate,
};

/// Outcome of [`PasswordResetTokenRepository::redeem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redemption {
    Redeemed,
    /// Another consumer got there first; nothing was changed
    AlreadyUsed,
    /// The token was unused but past its expiry; nothing was changed
    Expired,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write
    #[error("record already exists")]
    Duplicate,
    #[error("record not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Duplicate,
            sqlx::Error::RowNotFound => StoreError::NotFound,
            _ => StoreError::Database(e),
        }
    }
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Fails with [`StoreError::Duplicate`] when the email is taken.
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;
    async fn get_user_by_id(&self, id: &str) -> Result<Option<User>, StoreError>;
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    /// Returns the updated user, or [`StoreError::NotFound`].
    async fn update_user(&self, id: &str, update: UserUpdate) -> Result<User, StoreError>;
}

#[async_trait]
pub trait IdentityRepository: Send + Sync {
    async fn create_identity(&self, identity: NewIdentity) -> Result<Identity, StoreError>;
    async fn get_identities_by_user_id(&self, user_id: &str) -> Result<Vec<Identity>, StoreError>;
    async fn get_identity_by_provider(
        &self,
        provider: &str,
        provider_id: &str,
    ) -> Result<Option<Identity>, StoreError>;
    async fn update_last_login(&self, user_id: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Creates a session with empty token fields.
    async fn create_session(&self, session: NewSession) -> Result<Session, StoreError>;
    async fn get_session_by_id(&self, id: &str) -> Result<Option<Session>, StoreError>;
    /// Most recently created session of the user.
    async fn get_session_by_user_id(&self, user_id: &str) -> Result<Option<Session>, StoreError>;
    /// Overwrite the token pair in place.
    async fn update_tokens(&self, session_id: &str, tokens: SessionTokens)
    -> Result<(), StoreError>;
    /// Overwrite the token pair only if the stored refresh token is still
    /// `expected_refresh_token`. Returns whether the pair was written.
    async fn rotate_tokens(
        &self,
        session_id: &str,
        expected_refresh_token: &str,
        tokens: SessionTokens,
    ) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait PasswordResetTokenRepository: Send + Sync {
    async fn create_token(
        &self,
        token: NewPasswordResetToken,
    ) -> Result<PasswordResetToken, StoreError>;
    async fn get_token_by_jti(&self, jti: &str) -> Result<Option<PasswordResetToken>, StoreError>;
    /// Set `used` where `jti` matches and `used` is false. Returns whether a
    /// record changed.
    async fn mark_used(&self, jti: &str) -> Result<bool, StoreError>;
    /// Mark every unused token of the user as used. Returns how many changed.
    async fn invalidate_all_unused_for_user(&self, user_id: &str) -> Result<u64, StoreError>;
    /// Remove tokens past their expiry. Returns how many were removed.
    async fn delete_expired(&self) -> Result<u64, StoreError>;

    /// Supersede the user's unused tokens and insert `token`.
    ///
    /// The default runs the two steps in sequence, leaving a short window in
    /// which an older token is still unused. Backends with transactions
    /// override it to apply both at once.
    async fn create_superseding(
        &self,
        token: NewPasswordResetToken,
    ) -> Result<PasswordResetToken, StoreError> {
        self.invalidate_all_unused_for_user(&token.user_id).await?;
        self.create_token(token).await
    }

    /// Write `password_hash` onto the token's owner, then mark the token used
    /// where it is still unused and not expired at `now`, as one unit.
    ///
    /// Any outcome other than [`Redemption::Redeemed`] changes nothing.
    /// Fails with [`StoreError::NotFound`] when the token or its owner is gone.
    async fn redeem(
        &self,
        jti: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Redemption, StoreError>;
}
