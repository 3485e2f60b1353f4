//! Axum route handlers for `/api/admin/*`. Every handler requires `AdminUser`.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::extractors::AdminUser;
use crate::auth::service;
use crate::errors::AppError;
use crate::models::analytics::PublicAnalyticsEvent;
use crate::models::user::PublicUser;
use crate::state::AppState;

const DEFAULT_EVENT_LIMIT: usize = 100;
const MAX_EVENT_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsQuery {
    pub limit: Option<usize>,
    pub user_id: Option<Uuid>,
}

/// GET /api/admin/users
pub async fn handle_list_users(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> Result<Json<Value>, AppError> {
    let users: Vec<PublicUser> = state.users.list().await?.iter().map(PublicUser::from).collect();
    Ok(Json(json!({
        "success": true,
        "count": users.len(),
        "users": users,
    })))
}

/// DELETE /api/admin/users/:id
pub async fn handle_delete_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    service::delete_user(&state, &admin, user_id).await?;
    Ok(Json(json!({ "success": true, "message": "User deleted" })))
}

/// GET /api/admin/analytics?limit=&userId=
pub async fn handle_list_analytics(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<Value>, AppError> {
    let events = match query.user_id {
        Some(user_id) => state.analytics.for_user(user_id).await?,
        None => {
            let limit = query
                .limit
                .unwrap_or(DEFAULT_EVENT_LIMIT)
                .clamp(1, MAX_EVENT_LIMIT);
            state.analytics.recent(limit).await?
        }
    };
    let events: Vec<PublicAnalyticsEvent> = events.iter().map(PublicAnalyticsEvent::from).collect();
    Ok(Json(json!({ "success": true, "count": events.len(), "events": events })))
}
