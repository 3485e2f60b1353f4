use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Append-only usage record. Written on auth and feature access, never mutated.
/// This is also the on-disk shape; API clients get [`PublicAnalyticsEvent`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub feature_name: String,
    pub action: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// Analytics event as returned by the admin API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicAnalyticsEvent {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub feature_name: String,
    pub action: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl From<&AnalyticsEvent> for PublicAnalyticsEvent {
    fn from(event: &AnalyticsEvent) -> Self {
        Self {
            id: event.id,
            user_id: event.user_id,
            feature_name: event.feature_name.clone(),
            action: event.action.clone(),
            metadata: event.metadata.clone(),
            created_at: event.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewAnalyticsEvent {
    pub user_id: Option<Uuid>,
    pub feature_name: String,
    pub action: String,
    pub metadata: Value,
}

impl NewAnalyticsEvent {
    pub fn new(user_id: Option<Uuid>, feature_name: &str, action: &str) -> Self {
        Self {
            user_id,
            feature_name: feature_name.to_string(),
            action: action.to_string(),
            metadata: Value::Object(Default::default()),
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}
