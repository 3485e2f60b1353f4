//! PostgreSQL backend. Schema lives in `migrations/`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{normalize_email, AnalyticsRepository, StoreError, UserRepository};
use crate::models::analytics::{AnalyticsEvent, NewAnalyticsEvent};
use crate::models::user::{NewUser, User, UserUpdate};

const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    password_hash: String,
    name: String,
    role: String,
    is_active: bool,
    email_verified: bool,
    verification_token: Option<String>,
    verification_expires: Option<DateTime<Utc>>,
    last_login: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            name: row.name,
            role: row.role.parse().map_err(StoreError::Decode)?,
            is_active: row.is_active,
            email_verified: row.email_verified,
            verification_token: row.verification_token,
            verification_expires: row.verification_expires,
            last_login: row.last_login,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct AnalyticsRow {
    id: Uuid,
    user_id: Option<Uuid>,
    feature_name: String,
    action: String,
    metadata: Value,
    created_at: DateTime<Utc>,
}

impl From<AnalyticsRow> for AnalyticsEvent {
    fn from(row: AnalyticsRow) -> Self {
        AnalyticsEvent {
            id: row.id,
            user_id: row.user_id,
            feature_name: row.feature_name,
            action: row.action,
            metadata: row.metadata,
            created_at: row.created_at,
        }
    }
}

/// Maps a unique-constraint violation on insert/update to `DuplicateEmail`.
fn map_write_error(e: sqlx::Error) -> StoreError {
    let is_unique_violation = e
        .as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == UNIQUE_VIOLATION);
    if is_unique_violation {
        StoreError::DuplicateEmail
    } else {
        StoreError::Database(e)
    }
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgStore {
    async fn create(&self, new_user: NewUser) -> Result<User, StoreError> {
        let row: UserRow = sqlx::query_as(
            r#"
            INSERT INTO users (id, email, password_hash, name, role)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(normalize_email(&new_user.email))
        .bind(&new_user.password_hash)
        .bind(&new_user.name)
        .bind(new_user.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(map_write_error)?;

        row.try_into()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE LOWER(email) = $1")
            .bind(normalize_email(email))
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn find_by_verification_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE verification_token = $1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn update(&self, id: Uuid, mut update: UserUpdate) -> Result<Option<User>, StoreError> {
        if let Some(email) = update.email.as_mut() {
            *email = normalize_email(email);
        }

        // Row lock so the read-apply-write below cannot interleave with another update.
        let mut tx = self.pool.begin().await?;
        let existing =
            sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(existing) = existing else {
            return Ok(None);
        };

        let mut user = User::try_from(existing)?;
        update.apply_to(&mut user, Utc::now());

        let row: UserRow = sqlx::query_as(
            r#"
            UPDATE users SET
                email = $2,
                password_hash = $3,
                name = $4,
                role = $5,
                is_active = $6,
                email_verified = $7,
                verification_token = $8,
                verification_expires = $9,
                last_login = $10,
                updated_at = $11
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(user.role.as_str())
        .bind(user.is_active)
        .bind(user.email_verified)
        .bind(&user.verification_token)
        .bind(user.verification_expires)
        .bind(user.last_login)
        .bind(user.updated_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_write_error)?;

        tx.commit().await?;
        Ok(Some(row.try_into()?))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(User::try_from)
            .collect()
    }
}

#[async_trait]
impl AnalyticsRepository for PgStore {
    async fn record(&self, event: NewAnalyticsEvent) -> Result<AnalyticsEvent, StoreError> {
        let row: AnalyticsRow = sqlx::query_as(
            r#"
            INSERT INTO analytics (id, user_id, feature_name, action, metadata)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(event.user_id)
        .bind(&event.feature_name)
        .bind(&event.action)
        .bind(&event.metadata)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AnalyticsEvent>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query_as::<_, AnalyticsRow>(
            "SELECT * FROM analytics ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(AnalyticsEvent::from).collect())
    }

    async fn for_user(&self, user_id: Uuid) -> Result<Vec<AnalyticsEvent>, StoreError> {
        let rows = sqlx::query_as::<_, AnalyticsRow>(
            "SELECT * FROM analytics WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(AnalyticsEvent::from).collect())
    }
}
