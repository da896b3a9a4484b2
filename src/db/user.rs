use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;

use super::models::{NewUser, User, UserUpdate, from_unix};
use super::repository::{StoreError, UserRepository};
use super::{new_id, now_unix};

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    email: String,
    password_hash: String,
    created_at: i64,
    updated_at: i64,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            created_at: from_unix(row.created_at),
            updated_at: from_unix(row.updated_at),
        }
    }
}

const USER_COLUMNS: &str = "id, email, password_hash, created_at, updated_at";

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for UserStore {
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let id = new_id();
        let now = now_unix();

        sqlx::query(
            "INSERT INTO users (id, email, password_hash, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(User {
            id,
            email: user.email,
            password_hash: user.password_hash,
            created_at: from_unix(now),
            updated_at: from_unix(now),
        })
    }

    async fn get_user_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(User::from))
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"))
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(User::from))
    }

    async fn update_user(&self, id: &str, update: UserUpdate) -> Result<User, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "UPDATE users
             SET email = COALESCE(?, email),
                 password_hash = COALESCE(?, password_hash),
                 updated_at = ?
             WHERE id = ?
             RETURNING {USER_COLUMNS}"
        ))
        .bind(update.email)
        .bind(update.password_hash)
        .bind(now_unix())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::from).ok_or(StoreError::NotFound)
    }
}
