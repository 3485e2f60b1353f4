//! JSON-file backend: each collection is one JSON array on disk.
//!
//! Every mutation is a whole-file read-modify-write. Writers to the same file are
//! serialized by an async mutex and the new contents land via temp file + rename,
//! so readers never see a partial file and concurrent writers never drop updates.

use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use super::{normalize_email, AnalyticsRepository, StoreError, UserRepository};
use crate::models::analytics::{AnalyticsEvent, NewAnalyticsEvent};
use crate::models::user::{NewUser, User, UserUpdate};

const USERS_FILE: &str = "users.json";
const ANALYTICS_FILE: &str = "analytics.json";

struct JsonCollection<T> {
    path: PathBuf,
    write_lock: Mutex<()>,
    _item: PhantomData<fn() -> T>,
}

impl<T> JsonCollection<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
            _item: PhantomData,
        }
    }

    /// Creates the file as an empty array if it does not exist yet.
    async fn ensure_exists(&self) -> Result<(), StoreError> {
        if tokio::fs::try_exists(&self.path).await? {
            return Ok(());
        }
        info!("Creating empty data file {}", self.path.display());
        self.save(&[]).await
    }

    async fn load(&self) -> Result<Vec<T>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn save(&self, items: &[T]) -> Result<(), StoreError> {
        let contents = serde_json::to_vec_pretty(items)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&path, &contents))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
    }

    /// Runs `f` against the current contents and persists the result.
    /// Nothing is written when `f` returns an error.
    async fn mutate<R>(
        &self,
        f: impl FnOnce(&mut Vec<T>) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut items = self.load().await?;
        let result = f(&mut items)?;
        self.save(&items).await?;
        debug!("Wrote {} records to {}", items.len(), self.path.display());
        Ok(result)
    }
}

fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

/// Users and analytics kept as flat JSON files under one data directory.
pub struct JsonFileStore {
    users: JsonCollection<User>,
    analytics: JsonCollection<AnalyticsEvent>,
}

impl JsonFileStore {
    /// Opens (and if needed initializes) the data directory.
    pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let data_dir = data_dir.as_ref();
        tokio::fs::create_dir_all(data_dir).await?;

        let store = Self {
            users: JsonCollection::new(data_dir.join(USERS_FILE)),
            analytics: JsonCollection::new(data_dir.join(ANALYTICS_FILE)),
        };
        store.users.ensure_exists().await?;
        store.analytics.ensure_exists().await?;

        info!("JSON file store ready at {}", data_dir.display());
        Ok(store)
    }
}

#[async_trait]
impl UserRepository for JsonFileStore {
    async fn create(&self, new_user: NewUser) -> Result<User, StoreError> {
        let email = normalize_email(&new_user.email);
        self.users
            .mutate(move |users| {
                if users.iter().any(|u| u.email == email) {
                    return Err(StoreError::DuplicateEmail);
                }
                let now = Utc::now();
                let user = User {
                    id: Uuid::new_v4(),
                    email,
                    password_hash: new_user.password_hash,
                    name: new_user.name,
                    role: new_user.role,
                    is_active: true,
                    email_verified: false,
                    verification_token: None,
                    verification_expires: None,
                    last_login: None,
                    created_at: now,
                    updated_at: now,
                };
                users.push(user.clone());
                Ok(user)
            })
            .await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.load().await?.into_iter().find(|u| u.id == id))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let email = normalize_email(email);
        Ok(self
            .users
            .load()
            .await?
            .into_iter()
            .find(|u| u.email == email))
    }

    async fn find_by_verification_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .users
            .load()
            .await?
            .into_iter()
            .find(|u| u.verification_token.as_deref() == Some(token)))
    }

    async fn update(&self, id: Uuid, mut update: UserUpdate) -> Result<Option<User>, StoreError> {
        if let Some(email) = update.email.as_mut() {
            *email = normalize_email(email);
        }
        self.users
            .mutate(move |users| {
                if let Some(email) = &update.email {
                    if users.iter().any(|u| u.id != id && &u.email == email) {
                        return Err(StoreError::DuplicateEmail);
                    }
                }
                let Some(user) = users.iter_mut().find(|u| u.id == id) else {
                    return Ok(None);
                };
                update.apply_to(user, Utc::now());
                Ok(Some(user.clone()))
            })
            .await
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        self.users
            .mutate(move |users| {
                let before = users.len();
                users.retain(|u| u.id != id);
                Ok(users.len() != before)
            })
            .await
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        let mut users = self.users.load().await?;
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users)
    }
}

#[async_trait]
impl AnalyticsRepository for JsonFileStore {
    async fn record(&self, event: NewAnalyticsEvent) -> Result<AnalyticsEvent, StoreError> {
        self.analytics
            .mutate(move |events| {
                let event = AnalyticsEvent {
                    id: Uuid::new_v4(),
                    user_id: event.user_id,
                    feature_name: event.feature_name,
                    action: event.action,
                    metadata: event.metadata,
                    created_at: Utc::now(),
                };
                events.push(event.clone());
                Ok(event)
            })
            .await
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AnalyticsEvent>, StoreError> {
        // Appended in order, so the tail is the newest.
        let events = self.analytics.load().await?;
        Ok(events.into_iter().rev().take(limit).collect())
    }

    async fn for_user(&self, user_id: Uuid) -> Result<Vec<AnalyticsEvent>, StoreError> {
        Ok(self
            .analytics
            .load()
            .await?
            .into_iter()
            .filter(|e| e.user_id == Some(user_id))
            .collect())
    }
}
