use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;

use super::models::{Identity, NewIdentity, from_unix};
use super::repository::{IdentityRepository, StoreError};
use super::{new_id, now_unix};

/// Store for the provider links of each user.
#[derive(Clone)]
pub struct IdentityStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct IdentityRow {
    id: String,
    user_id: String,
    provider: String,
    provider_id: String,
    email: String,
    last_login_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl From<IdentityRow> for Identity {
    fn from(row: IdentityRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            provider: row.provider,
            provider_id: row.provider_id,
            email: row.email,
            last_login_at: row.last_login_at.map(from_unix),
            created_at: from_unix(row.created_at),
            updated_at: from_unix(row.updated_at),
        }
    }
}

const IDENTITY_COLUMNS: &str =
    "id, user_id, provider, provider_id, email, last_login_at, created_at, updated_at";

impl IdentityStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityRepository for IdentityStore {
    async fn create_identity(&self, identity: NewIdentity) -> Result<Identity, StoreError> {
        let id = new_id();
        let now = now_unix();

        sqlx::query(
            "INSERT INTO identities (id, user_id, provider, provider_id, email, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&identity.user_id)
        .bind(&identity.provider)
        .bind(&identity.provider_id)
        .bind(&identity.email)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(Identity {
            id,
            user_id: identity.user_id,
            provider: identity.provider,
            provider_id: identity.provider_id,
            email: identity.email,
            last_login_at: None,
            created_at: from_unix(now),
            updated_at: from_unix(now),
        })
    }

    async fn get_identities_by_user_id(&self, user_id: &str) -> Result<Vec<Identity>, StoreError> {
        let rows: Vec<IdentityRow> = sqlx::query_as(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM identities WHERE user_id = ? ORDER BY created_at"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Identity::from).collect())
    }

    async fn get_identity_by_provider(
        &self,
        provider: &str,
        provider_id: &str,
    ) -> Result<Option<Identity>, StoreError> {
        let row: Option<IdentityRow> = sqlx::query_as(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM identities WHERE provider = ? AND provider_id = ?"
        ))
        .bind(provider)
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Identity::from))
    }

    async fn update_last_login(&self, user_id: &str) -> Result<(), StoreError> {
        let now = now_unix();
        sqlx::query("UPDATE identities SET last_login_at = ?, updated_at = ? WHERE user_id = ?")
            .bind(now)
            .bind(now)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
