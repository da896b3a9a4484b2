//! Password reset token storage.
//!
//! A token is consumable while `used = 0` and `expires_at` is in the future.
//! Every transition to used is a conditional update on `used = 0`, so the
//! number of affected rows tells the caller whether it won.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;

use super::models::{NewPasswordResetToken, PasswordResetToken, from_unix};
use super::repository::{PasswordResetTokenRepository, Redemption, StoreError};
use super::{new_id, now_unix};

#[derive(Clone)]
pub struct PasswordResetTokenStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct PasswordResetTokenRow {
    id: String,
    user_id: String,
    jti: String,
    email: String,
    used: i32,
    expires_at: i64,
    created_at: i64,
    updated_at: i64,
}

impl From<PasswordResetTokenRow> for PasswordResetToken {
    fn from(row: PasswordResetTokenRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            jti: row.jti,
            email: row.email,
            used: row.used != 0,
            expires_at: from_unix(row.expires_at),
            created_at: from_unix(row.created_at),
            updated_at: from_unix(row.updated_at),
        }
    }
}

const INSERT_TOKEN: &str = "INSERT INTO password_reset_tokens
     (id, user_id, jti, email, used, expires_at, created_at, updated_at)
     VALUES (?, ?, ?, ?, 0, ?, ?, ?)";

const INVALIDATE_UNUSED: &str =
    "UPDATE password_reset_tokens SET used = 1, updated_at = ? WHERE user_id = ? AND used = 0";

const MARK_USED: &str =
    "UPDATE password_reset_tokens SET used = 1, updated_at = ? WHERE jti = ? AND used = 0";

const MARK_REDEEMED: &str = "UPDATE password_reset_tokens SET used = 1, updated_at = ?
     WHERE jti = ? AND used = 0 AND expires_at > ?";

impl PasswordResetTokenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn record(id: String, now: i64, token: NewPasswordResetToken) -> PasswordResetToken {
        PasswordResetToken {
            id,
            user_id: token.user_id,
            jti: token.jti,
            email: token.email,
            used: false,
            expires_at: token.expires_at,
            created_at: from_unix(now),
            updated_at: from_unix(now),
        }
    }
}

#[async_trait]
impl PasswordResetTokenRepository for PasswordResetTokenStore {
    async fn create_token(
        &self,
        token: NewPasswordResetToken,
    ) -> Result<PasswordResetToken, StoreError> {
        let id = new_id();
        let now = now_unix();

        sqlx::query(INSERT_TOKEN)
            .bind(&id)
            .bind(&token.user_id)
            .bind(&token.jti)
            .bind(&token.email)
            .bind(token.expires_at.timestamp())
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(Self::record(id, now, token))
    }

    async fn get_token_by_jti(&self, jti: &str) -> Result<Option<PasswordResetToken>, StoreError> {
        let row: Option<PasswordResetTokenRow> = sqlx::query_as(
            "SELECT id, user_id, jti, email, used, expires_at, created_at, updated_at
             FROM password_reset_tokens WHERE jti = ?",
        )
        .bind(jti)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(PasswordResetToken::from))
    }

    async fn mark_used(&self, jti: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(MARK_USED)
            .bind(now_unix())
            .bind(jti)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn invalidate_all_unused_for_user(&self, user_id: &str) -> Result<u64, StoreError> {
        let result = sqlx::query(INVALIDATE_UNUSED)
            .bind(now_unix())
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM password_reset_tokens WHERE expires_at <= ?")
            .bind(now_unix())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn create_superseding(
        &self,
        token: NewPasswordResetToken,
    ) -> Result<PasswordResetToken, StoreError> {
        let id = new_id();
        let now = now_unix();

        let mut tx = self.pool.begin().await?;

        sqlx::query(INVALIDATE_UNUSED)
            .bind(now)
            .bind(&token.user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(INSERT_TOKEN)
            .bind(&id)
            .bind(&token.user_id)
            .bind(&token.jti)
            .bind(&token.email)
            .bind(token.expires_at.timestamp())
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Self::record(id, now, token))
    }

    async fn redeem(
        &self,
        jti: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Redemption, StoreError> {
        let now = now.timestamp();
        let mut tx = self.pool.begin().await?;

        // Password first, then the used flag. Both roll back together.
        let updated = sqlx::query(
            "UPDATE users SET password_hash = ?, updated_at = ?
             WHERE id = (SELECT user_id FROM password_reset_tokens WHERE jti = ?)",
        )
        .bind(password_hash)
        .bind(now)
        .bind(jti)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StoreError::NotFound);
        }

        let marked = sqlx::query(MARK_REDEEMED)
            .bind(now)
            .bind(jti)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        if marked.rows_affected() == 0 {
            let used: Option<(i32,)> =
                sqlx::query_as("SELECT used FROM password_reset_tokens WHERE jti = ?")
                    .bind(jti)
                    .fetch_optional(&mut *tx)
                    .await?;
            tx.rollback().await?;
            return Ok(match used {
                Some((0,)) => Redemption::Expired,
                _ => Redemption::AlreadyUsed,
            });
        }

        tx.commit().await?;
        Ok(Redemption::Redeemed)
    }
}
