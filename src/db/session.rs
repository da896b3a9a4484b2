use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;

use super::models::{ClientMetadata, NewSession, Session, SessionTokens, from_unix};
use super::repository::{SessionRepository, StoreError};
use super::{new_id, now_unix};

#[derive(Clone)]
pub struct SessionStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    user_id: String,
    access_token: String,
    access_token_expires_at: Option<i64>,
    refresh_token: String,
    refresh_token_expires_at: Option<i64>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            access_token: row.access_token,
            access_token_expires_at: row.access_token_expires_at.map(from_unix),
            refresh_token: row.refresh_token,
            refresh_token_expires_at: row.refresh_token_expires_at.map(from_unix),
            client: ClientMetadata {
                ip_address: row.ip_address,
                user_agent: row.user_agent,
            },
            created_at: from_unix(row.created_at),
            updated_at: from_unix(row.updated_at),
        }
    }
}

const SESSION_COLUMNS: &str = "id, user_id, access_token, access_token_expires_at, \
     refresh_token, refresh_token_expires_at, ip_address, user_agent, created_at, updated_at";

impl SessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for SessionStore {
    async fn create_session(&self, session: NewSession) -> Result<Session, StoreError> {
        let id = new_id();
        let now = now_unix();

        sqlx::query(
            "INSERT INTO sessions (id, user_id, ip_address, user_agent, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&session.user_id)
        .bind(&session.client.ip_address)
        .bind(&session.client.user_agent)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(Session {
            id,
            user_id: session.user_id,
            access_token: String::new(),
            access_token_expires_at: None,
            refresh_token: String::new(),
            refresh_token_expires_at: None,
            client: session.client,
            created_at: from_unix(now),
            updated_at: from_unix(now),
        })
    }

    async fn get_session_by_id(&self, id: &str) -> Result<Option<Session>, StoreError> {
        let row: Option<SessionRow> =
            sqlx::query_as(&format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Session::from))
    }

    async fn get_session_by_user_id(&self, user_id: &str) -> Result<Option<Session>, StoreError> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE user_id = ?
             ORDER BY created_at DESC, rowid DESC LIMIT 1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Session::from))
    }

    async fn update_tokens(
        &self,
        session_id: &str,
        tokens: SessionTokens,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE sessions
             SET access_token = ?, access_token_expires_at = ?,
                 refresh_token = ?, refresh_token_expires_at = ?,
                 updated_at = ?
             WHERE id = ?",
        )
        .bind(&tokens.access_token)
        .bind(tokens.access_token_expires_at.timestamp())
        .bind(&tokens.refresh_token)
        .bind(tokens.refresh_token_expires_at.timestamp())
        .bind(now_unix())
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn rotate_tokens(
        &self,
        session_id: &str,
        expected_refresh_token: &str,
        tokens: SessionTokens,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE sessions
             SET access_token = ?, access_token_expires_at = ?,
                 refresh_token = ?, refresh_token_expires_at = ?,
                 updated_at = ?
             WHERE id = ? AND refresh_token = ?",
        )
        .bind(&tokens.access_token)
        .bind(tokens.access_token_expires_at.timestamp())
        .bind(&tokens.refresh_token)
        .bind(tokens.refresh_token_expires_at.timestamp())
        .bind(now_unix())
        .bind(session_id)
        .bind(expected_refresh_token)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
