use tracing::warn;

use crate::models::analytics::NewAnalyticsEvent;
use crate::store::AnalyticsRepository;

/// Appends a usage event. Analytics never fails the request that produced it.
pub async fn track(repo: &dyn AnalyticsRepository, event: NewAnalyticsEvent) {
    let feature = event.feature_name.clone();
    let action = event.action.clone();
    if let Err(e) = repo.record(event).await {
        warn!(feature = %feature, action = %action, "Failed to record analytics event: {e}");
    }
}
