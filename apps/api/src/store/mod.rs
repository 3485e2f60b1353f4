//! Persistence: one repository trait per entity.
//!
//! Backends:
//! - `JsonFileStore`: `users.json` / `analytics.json` arrays in a data directory.
//! - `PgStore`: PostgreSQL through `sqlx`, for multi-instance deployments.
//!
//! `AppState` carries `Arc<dyn UserRepository>` and `Arc<dyn AnalyticsRepository>`,
//! chosen at startup from `DATABASE_URL`.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::analytics::{AnalyticsEvent, NewAnalyticsEvent};
use crate::models::user::{NewUser, User, UserUpdate};

pub mod json_file;
pub mod postgres;

pub use json_file::JsonFileStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("email address is already registered")]
    DuplicateEmail,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt data file: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid stored value: {0}")]
    Decode(String),
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Inserts a new user. Fails with [`StoreError::DuplicateEmail`] if the email is taken.
    async fn create(&self, new_user: NewUser) -> Result<User, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// Case-insensitive lookup.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_verification_token(&self, token: &str) -> Result<Option<User>, StoreError>;

    /// Applies a partial update. Returns `None` when no user has this id.
    async fn update(&self, id: Uuid, update: UserUpdate) -> Result<Option<User>, StoreError>;

    /// Returns `false` when no user has this id.
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;

    /// All users, newest first.
    async fn list(&self) -> Result<Vec<User>, StoreError>;
}

#[async_trait]
pub trait AnalyticsRepository: Send + Sync {
    async fn record(&self, event: NewAnalyticsEvent) -> Result<AnalyticsEvent, StoreError>;

    /// Most recent events first.
    async fn recent(&self, limit: usize) -> Result<Vec<AnalyticsEvent>, StoreError>;

    async fn for_user(&self, user_id: Uuid) -> Result<Vec<AnalyticsEvent>, StoreError>;
}

/// Emails are compared and stored lowercase.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
