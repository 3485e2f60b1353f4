//! User lifecycle: registration, login, email verification, profile edits, admin deletes.
//!
//! Handlers stay thin; every rule about accounts lives here so it can be tested
//! against a real store without going through HTTP.

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::analytics::track;
use crate::auth::password::{hash_password, verify_password};
use crate::auth::tokens::{generate_verification_token, SessionToken, VERIFICATION_TTL_HOURS};
use crate::errors::AppError;
use crate::mail::{verification_email, verification_link};
use crate::models::analytics::NewAnalyticsEvent;
use crate::models::user::{NewUser, Role, User, UserUpdate};
use crate::state::AppState;
use crate::store::{normalize_email, UserRepository};

const AUTH_FEATURE: &str = "auth";

#[derive(Debug, Clone)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug)]
pub struct RegisterOutcome {
    pub user: User,
    /// `false` when the verification email could not be delivered; the account still exists.
    pub verification_email_sent: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub name: Option<String>,
    pub email: Option<String>,
}

fn invalid_credentials() -> AppError {
    AppError::Unauthorized("Invalid credentials".to_string())
}

/// Runs CPU-bound hashing on the blocking pool.
async fn run_blocking<T, F>(f: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(e.into()))?
}

pub async fn register(state: &AppState, registration: Registration) -> Result<RegisterOutcome, AppError> {
    let email = normalize_email(&registration.email);
    if state.users.find_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict(
            "User with this email already exists".to_string(),
        ));
    }

    let password = registration.password;
    let password_hash = run_blocking(move || hash_password(&password)).await?;

    let user = state
        .users
        .create(NewUser {
            email,
            password_hash,
            name: registration.name.trim().to_string(),
            role: Role::User,
        })
        .await?;
    info!(user_id = %user.id, "User registered");

    let (user, token) = issue_verification_token(
        state.users.as_ref(),
        user.id,
        Duration::hours(VERIFICATION_TTL_HOURS),
    )
    .await?;

    let verification_email_sent = match send_verification_email(state, &user, &token).await {
        Ok(()) => true,
        Err(e) => {
            warn!(user_id = %user.id, "Verification email failed after registration: {e}");
            false
        }
    };

    track(
        state.analytics.as_ref(),
        NewAnalyticsEvent::new(Some(user.id), AUTH_FEATURE, "register"),
    )
    .await;

    Ok(RegisterOutcome {
        user,
        verification_email_sent,
    })
}

pub async fn login(
    state: &AppState,
    email: &str,
    password: &str,
) -> Result<(User, SessionToken), AppError> {
    let Some(user) = state.users.find_by_email(email).await? else {
        warn!("Login attempt for unknown email");
        return Err(invalid_credentials());
    };

    let candidate = password.to_string();
    let hash = user.password_hash.clone();
    if !run_blocking(move || verify_password(&candidate, &hash)).await? {
        warn!(user_id = %user.id, "Login attempt with wrong password");
        return Err(invalid_credentials());
    }

    if !user.is_active {
        return Err(AppError::Forbidden("Account is deactivated".to_string()));
    }
    if !user.email_verified {
        return Err(AppError::EmailNotVerified);
    }

    let user = state
        .users
        .update(
            user.id,
            UserUpdate {
                last_login: Some(Utc::now()),
                ..Default::default()
            },
        )
        .await?
        .ok_or_else(invalid_credentials)?;

    let session = state.tokens.issue(&user)?;

    track(
        state.analytics.as_ref(),
        NewAnalyticsEvent::new(Some(user.id), AUTH_FEATURE, "login"),
    )
    .await;
    info!(user_id = %user.id, "User logged in");

    Ok((user, session))
}

/// Replaces any outstanding verification token with a fresh one valid for `ttl`.
pub async fn issue_verification_token(
    users: &dyn UserRepository,
    user_id: Uuid,
    ttl: Duration,
) -> Result<(User, String), AppError> {
    let token = generate_verification_token();
    let user = users
        .update(
            user_id,
            UserUpdate {
                verification_token: Some(Some(token.clone())),
                verification_expires: Some(Some(Utc::now() + ttl)),
                ..Default::default()
            },
        )
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok((user, token))
}

async fn send_verification_email(state: &AppState, user: &User, token: &str) -> Result<(), AppError> {
    let link = verification_link(&state.config.frontend_url, token);
    state
        .mailer
        .send(verification_email(&user.email, &user.name, &link))
        .await?;
    Ok(())
}

/// Consumes a verification token. A token is accepted once; afterwards it is gone.
pub async fn verify_email(users: &dyn UserRepository, token: &str) -> Result<User, AppError> {
    verify_email_at(users, token, Utc::now()).await
}

async fn verify_email_at(
    users: &dyn UserRepository,
    token: &str,
    now: DateTime<Utc>,
) -> Result<User, AppError> {
    let user = users
        .find_by_verification_token(token)
        .await?
        .ok_or_else(|| AppError::Validation("Invalid verification token".to_string()))?;

    let expired = user.verification_expires.map_or(true, |expires| expires <= now);
    if expired {
        return Err(AppError::Validation(
            "Verification token has expired".to_string(),
        ));
    }

    let user = users
        .update(
            user.id,
            UserUpdate {
                email_verified: Some(true),
                verification_token: Some(None),
                verification_expires: Some(None),
                ..Default::default()
            },
        )
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    info!(user_id = %user.id, "Email verified");
    Ok(user)
}

pub async fn resend_verification(state: &AppState, email: &str) -> Result<(), AppError> {
    let user = state
        .users
        .find_by_email(email)
        .await?
        .ok_or_else(|| AppError::NotFound("No account found for this email".to_string()))?;

    if user.email_verified {
        return Err(AppError::Validation("Email is already verified".to_string()));
    }

    let (user, token) = issue_verification_token(
        state.users.as_ref(),
        user.id,
        Duration::hours(VERIFICATION_TTL_HOURS),
    )
    .await?;
    send_verification_email(state, &user, &token).await?;

    track(
        state.analytics.as_ref(),
        NewAnalyticsEvent::new(Some(user.id), AUTH_FEATURE, "resend_verification"),
    )
    .await;
    Ok(())
}

/// Applies only the supplied fields. Changing the email requires verifying it again.
pub async fn update_profile(
    state: &AppState,
    user: &User,
    changes: ProfileChanges,
) -> Result<User, AppError> {
    let mut update = UserUpdate::default();

    if let Some(name) = changes.name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::Validation("Name cannot be empty".to_string()));
        }
        update.name = Some(name);
    }

    let mut new_token = None;
    if let Some(email) = changes.email {
        let email = normalize_email(&email);
        if email != user.email {
            if state.users.find_by_email(&email).await?.is_some() {
                return Err(AppError::Conflict(
                    "User with this email already exists".to_string(),
                ));
            }
            let token = generate_verification_token();
            update.email = Some(email);
            update.email_verified = Some(false);
            update.verification_token = Some(Some(token.clone()));
            update.verification_expires =
                Some(Some(Utc::now() + Duration::hours(VERIFICATION_TTL_HOURS)));
            new_token = Some(token);
        }
    }

    let updated = state
        .users
        .update(user.id, update)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if let Some(token) = new_token {
        if let Err(e) = send_verification_email(state, &updated, &token).await {
            warn!(user_id = %updated.id, "Verification email failed after email change: {e}");
        }
    }

    track(
        state.analytics.as_ref(),
        NewAnalyticsEvent::new(Some(updated.id), AUTH_FEATURE, "update_profile"),
    )
    .await;
    Ok(updated)
}

pub async fn delete_user(state: &AppState, admin: &User, user_id: Uuid) -> Result<(), AppError> {
    if admin.id == user_id {
        return Err(AppError::Validation(
            "Admins cannot delete their own account".to_string(),
        ));
    }
    if !state.users.delete(user_id).await? {
        return Err(AppError::NotFound(format!("User {user_id} not found")));
    }

    info!(admin_id = %admin.id, %user_id, "User deleted by admin");
    track(
        state.analytics.as_ref(),
        NewAnalyticsEvent::new(Some(admin.id), "admin", "delete_user")
            .with_metadata(serde_json::json!({ "deletedUserId": user_id })),
    )
    .await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::testing::FailingMailer;
    use crate::test_support::{test_state, test_state_with_mailer, verification_token_for};

    fn registration(email: &str) -> Registration {
        Registration {
            name: "Ada Lovelace".to_string(),
            email: email.to_string(),
            password: "analytical-engine".to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_creates_unverified_user_with_token() {
        let (state, _dir, mailer) = test_state().await;

        let outcome = register(&state, registration("Ada@Example.com")).await.unwrap();

        assert_eq!(outcome.user.email, "ada@example.com");
        assert!(!outcome.user.email_verified);
        assert!(outcome.user.verification_token.is_some());
        assert!(outcome.verification_email_sent);
        assert_ne!(outcome.user.password_hash, "analytical-engine");
        assert_eq!(mailer.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_register_duplicate_email_rejected() {
        let (state, _dir, _mailer) = test_state().await;
        register(&state, registration("ada@example.com")).await.unwrap();

        let err = register(&state, registration("ADA@example.com")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_register_succeeds_when_email_fails() {
        let (state, _dir) = test_state_with_mailer(std::sync::Arc::new(FailingMailer)).await;

        let outcome = register(&state, registration("ada@example.com")).await.unwrap();
        assert!(!outcome.verification_email_sent);
        assert!(state.users.find_by_email("ada@example.com").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_login_requires_verified_email() {
        let (state, _dir, _mailer) = test_state().await;
        register(&state, registration("ada@example.com")).await.unwrap();

        let err = login(&state, "ada@example.com", "analytical-engine")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::EmailNotVerified));
    }

    #[tokio::test]
    async fn test_login_wrong_password_and_unknown_email_look_the_same() {
        let (state, _dir, _mailer) = test_state().await;
        register(&state, registration("ada@example.com")).await.unwrap();

        let wrong = login(&state, "ada@example.com", "nope").await.unwrap_err();
        let unknown = login(&state, "nobody@example.com", "nope").await.unwrap_err();
        assert!(matches!(&wrong, AppError::Unauthorized(m) if m == "Invalid credentials"));
        assert!(matches!(&unknown, AppError::Unauthorized(m) if m == "Invalid credentials"));
    }

    #[tokio::test]
    async fn test_verified_login_sets_last_login_and_issues_token() {
        let (state, _dir, _mailer) = test_state().await;
        register(&state, registration("ada@example.com")).await.unwrap();
        let token = verification_token_for(&state, "ada@example.com").await;
        verify_email(state.users.as_ref(), &token).await.unwrap();

        let (user, session) = login(&state, "ada@example.com", "analytical-engine")
            .await
            .unwrap();
        assert!(user.last_login.is_some());
        let claims = state.tokens.verify(&session.token).unwrap();
        assert_eq!(claims.sub, user.id);
    }

    #[tokio::test]
    async fn test_deactivated_account_cannot_login() {
        let (state, _dir, _mailer) = test_state().await;
        let outcome = register(&state, registration("ada@example.com")).await.unwrap();
        state
            .users
            .update(
                outcome.user.id,
                UserUpdate {
                    is_active: Some(false),
                    email_verified: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let err = login(&state, "ada@example.com", "analytical-engine")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_verification_token_is_single_use() {
        let (state, _dir, _mailer) = test_state().await;
        register(&state, registration("ada@example.com")).await.unwrap();
        let token = verification_token_for(&state, "ada@example.com").await;

        let user = verify_email(state.users.as_ref(), &token).await.unwrap();
        assert!(user.email_verified);
        assert!(user.verification_token.is_none());
        assert!(user.verification_expires.is_none());

        let err = verify_email(state.users.as_ref(), &token).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(m) if m.contains("Invalid")));
    }

    #[tokio::test]
    async fn test_expired_verification_token_rejected() {
        let (state, _dir, _mailer) = test_state().await;
        let outcome = register(&state, registration("ada@example.com")).await.unwrap();
        let (_, token) =
            issue_verification_token(state.users.as_ref(), outcome.user.id, Duration::hours(1))
                .await
                .unwrap();

        let later = Utc::now() + Duration::hours(2);
        let err = verify_email_at(state.users.as_ref(), &token, later)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(m) if m.contains("expired")));

        let user = state.users.find_by_id(outcome.user.id).await.unwrap().unwrap();
        assert!(!user.email_verified);
    }

    #[tokio::test]
    async fn test_resend_replaces_token() {
        let (state, _dir, mailer) = test_state().await;
        register(&state, registration("ada@example.com")).await.unwrap();
        let first = verification_token_for(&state, "ada@example.com").await;

        resend_verification(&state, "ada@example.com").await.unwrap();
        let second = verification_token_for(&state, "ada@example.com").await;

        assert_ne!(first, second);
        assert_eq!(mailer.sent.lock().unwrap().len(), 2);
        assert!(verify_email(state.users.as_ref(), &first).await.is_err());
        assert!(verify_email(state.users.as_ref(), &second).await.is_ok());
    }

    #[tokio::test]
    async fn test_resend_for_verified_or_unknown_email() {
        let (state, _dir, _mailer) = test_state().await;
        register(&state, registration("ada@example.com")).await.unwrap();
        let token = verification_token_for(&state, "ada@example.com").await;
        verify_email(state.users.as_ref(), &token).await.unwrap();

        let verified = resend_verification(&state, "ada@example.com").await.unwrap_err();
        assert!(matches!(verified, AppError::Validation(_)));
        let unknown = resend_verification(&state, "x@example.com").await.unwrap_err();
        assert!(matches!(unknown, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_profile_update_only_changes_supplied_fields() {
        let (state, _dir, _mailer) = test_state().await;
        let outcome = register(&state, registration("ada@example.com")).await.unwrap();
        let before = outcome.user;

        let after = update_profile(
            &state,
            &before,
            ProfileChanges {
                name: Some("Countess of Lovelace".to_string()),
                email: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(after.name, "Countess of Lovelace");
        assert_eq!(after.email, before.email);
        assert_eq!(after.password_hash, before.password_hash);
        assert_eq!(after.email_verified, before.email_verified);
        assert_eq!(after.verification_token, before.verification_token);
    }

    #[tokio::test]
    async fn test_profile_email_change_requires_reverification() {
        let (state, _dir, _mailer) = test_state().await;
        register(&state, registration("ada@example.com")).await.unwrap();
        let token = verification_token_for(&state, "ada@example.com").await;
        let verified = verify_email(state.users.as_ref(), &token).await.unwrap();

        let after = update_profile(
            &state,
            &verified,
            ProfileChanges {
                name: None,
                email: Some("ada@lovelace.org".to_string()),
            },
        )
        .await
        .unwrap();

        assert_eq!(after.email, "ada@lovelace.org");
        assert!(!after.email_verified);
        assert!(after.verification_token.is_some());
    }

    #[tokio::test]
    async fn test_admin_delete() {
        let (state, _dir, _mailer) = test_state().await;
        let admin = register(&state, registration("admin@example.com")).await.unwrap().user;
        let victim = register(&state, registration("ada@example.com")).await.unwrap().user;

        let own = delete_user(&state, &admin, admin.id).await.unwrap_err();
        assert!(matches!(own, AppError::Validation(_)));

        delete_user(&state, &admin, victim.id).await.unwrap();
        let again = delete_user(&state, &admin, victim.id).await.unwrap_err();
        assert!(matches!(again, AppError::NotFound(_)));
    }
}
