//! Axum route handlers for `/api/auth/*`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use validator::Validate;

use crate::analytics::track;
use crate::auth::extractors::AuthUser;
use crate::auth::service::{self, ProfileChanges, Registration};
use crate::errors::AppError;
use crate::models::analytics::NewAnalyticsEvent;
use crate::models::user::PublicUser;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 100, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "A valid email address is required"))]
    pub email: String,
    #[validate(length(min = 8, max = 128, message = "Password must be at least 8 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "A valid email address is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100, message = "Name cannot be empty"))]
    pub name: Option<String>,
    #[validate(email(message = "A valid email address is required"))]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResendVerificationRequest {
    #[validate(email(message = "A valid email address is required"))]
    pub email: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub success: bool,
    pub message: String,
    pub user: PublicUser,
    pub verification_email_sent: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub success: bool,
    pub token: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub user: PublicUser,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub success: bool,
    pub user: PublicUser,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl UserResponse {
    fn new(user: PublicUser) -> Self {
        Self {
            success: true,
            user,
            message: None,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/auth/register
pub async fn handle_register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    req.validate()?;

    let outcome = service::register(
        &state,
        Registration {
            name: req.name,
            email: req.email,
            password: req.password,
        },
    )
    .await?;

    let message = if outcome.verification_email_sent {
        "Registration successful. Please check your email to verify your account."
    } else {
        "Registration successful, but the verification email could not be sent. Please request a new one."
    };

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            success: true,
            message: message.to_string(),
            user: PublicUser::from(&outcome.user),
            verification_email_sent: outcome.verification_email_sent,
        }),
    ))
}

/// POST /api/auth/login
pub async fn handle_login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    req.validate()?;

    let (user, session) = service::login(&state, &req.email, &req.password).await?;

    Ok(Json(LoginResponse {
        success: true,
        token: session.token,
        expires_at: session.expires_at,
        user: PublicUser::from(&user),
    }))
}

/// POST /api/auth/logout
///
/// Sessions are stateless; the client discards its token. Recorded for analytics.
pub async fn handle_logout(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Json<Value> {
    track(
        state.analytics.as_ref(),
        NewAnalyticsEvent::new(Some(user.id), "auth", "logout"),
    )
    .await;

    Json(json!({ "success": true, "message": "Logged out successfully" }))
}

/// GET /api/auth/profile
pub async fn handle_get_profile(AuthUser(user): AuthUser) -> Json<UserResponse> {
    Json(UserResponse::new(PublicUser::from(&user)))
}

/// PUT /api/auth/profile
pub async fn handle_update_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, AppError> {
    req.validate()?;

    let email_changed = req
        .email
        .as_deref()
        .is_some_and(|e| crate::store::normalize_email(e) != user.email);

    let updated = service::update_profile(
        &state,
        &user,
        ProfileChanges {
            name: req.name,
            email: req.email,
        },
    )
    .await?;

    let mut response = UserResponse::new(PublicUser::from(&updated));
    response.message = Some(if email_changed {
        "Profile updated. Please verify your new email address.".to_string()
    } else {
        "Profile updated".to_string()
    });
    Ok(Json(response))
}

/// GET /api/auth/verify
///
/// Lets the client check that its stored token is still good.
pub async fn handle_verify_session(AuthUser(user): AuthUser) -> Json<Value> {
    Json(json!({
        "success": true,
        "valid": true,
        "user": PublicUser::from(&user),
    }))
}

/// GET /api/auth/verify-email/:token
pub async fn handle_verify_email(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<UserResponse>, AppError> {
    let user = service::verify_email(state.users.as_ref(), &token).await?;

    track(
        state.analytics.as_ref(),
        NewAnalyticsEvent::new(Some(user.id), "auth", "verify_email"),
    )
    .await;

    let mut response = UserResponse::new(PublicUser::from(&user));
    response.message = Some("Email verified successfully. You can now log in.".to_string());
    Ok(Json(response))
}

/// POST /api/auth/resend-verification
pub async fn handle_resend_verification(
    State(state): State<AppState>,
    Json(req): Json<ResendVerificationRequest>,
) -> Result<Json<Value>, AppError> {
    req.validate()?;

    service::resend_verification(&state, &req.email).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Verification email sent. Please check your inbox."
    })))
}
