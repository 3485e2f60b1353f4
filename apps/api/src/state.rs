use std::sync::Arc;

use crate::auth::tokens::TokenService;
use crate::config::Config;
use crate::content::templates::TemplateCatalog;
use crate::llm_client::LlmClient;
use crate::mail::Mailer;
use crate::rate_limit::RateLimiter;
use crate::store::{AnalyticsRepository, UserRepository};

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserRepository>,
    /// Append-only usage log.
    pub analytics: Arc<dyn AnalyticsRepository>,
    pub tokens: TokenService,
    /// SMTP in production, log-only when SMTP is not configured.
    pub mailer: Arc<dyn Mailer>,
    pub llm: LlmClient,
    pub templates: TemplateCatalog,
    /// Fixed-window limiter for `/api/*` feature and admin routes.
    pub api_limiter: RateLimiter,
    /// Tighter limiter for `/api/auth/*`.
    pub auth_limiter: RateLimiter,
    pub config: Config,
    /// "json" or "postgres", reported by the health check.
    pub store_backend: &'static str,
}
