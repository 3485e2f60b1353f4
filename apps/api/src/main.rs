mod analytics;
mod auth;
mod config;
mod content;
mod db;
mod errors;
mod llm_client;
mod mail;
mod models;
mod rate_limit;
mod routes;
mod state;
mod store;
#[cfg(test)]
mod test_support;

use anyhow::Result;
use axum::http::{
    header::{AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_TYPE, RETRY_AFTER},
    HeaderName, HeaderValue, Method,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::auth::tokens::TokenService;
use crate::config::Config;
use crate::content::templates::TemplateCatalog;
use crate::db::create_pool;
use crate::llm_client::LlmClient;
use crate::mail::{smtp::SmtpMailer, LogMailer, Mailer};
use crate::rate_limit::{
    MemoryRateLimitStore, RateLimitPolicy, RateLimitStore, RateLimiter, RedisRateLimitStore,
};
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::{AnalyticsRepository, JsonFileStore, PgStore, UserRepository};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{crate_name}={level},tower_http={level}",
                crate_name = env!("CARGO_CRATE_NAME"),
                level = &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting resume API v{}", env!("CARGO_PKG_VERSION"));

    // Users and analytics: PostgreSQL when configured, JSON files otherwise
    let (users, analytics, store_backend): (
        Arc<dyn UserRepository>,
        Arc<dyn AnalyticsRepository>,
        &'static str,
    ) = match &config.database_url {
        Some(url) => {
            let store = Arc::new(PgStore::new(create_pool(url).await?));
            info!("Using PostgreSQL store");
            let users: Arc<dyn UserRepository> = store.clone();
            let analytics: Arc<dyn AnalyticsRepository> = store;
            (users, analytics, "postgres")
        }
        None => {
            let store = Arc::new(JsonFileStore::open(&config.data_dir).await?);
            let users: Arc<dyn UserRepository> = store.clone();
            let analytics: Arc<dyn AnalyticsRepository> = store;
            (users, analytics, "json")
        }
    };

    // Rate-limit counters: shared through Redis when configured
    let counters: Arc<dyn RateLimitStore> = match &config.redis_url {
        Some(url) => {
            let store = RedisRateLimitStore::connect(url).await?;
            info!("Rate limit counters stored in Redis");
            Arc::new(store)
        }
        None => Arc::new(MemoryRateLimitStore::new()),
    };

    let mailer: Arc<dyn Mailer> = match &config.smtp {
        Some(smtp) => {
            info!("SMTP mailer configured for {}", smtp.host);
            Arc::new(SmtpMailer::new(smtp)?)
        }
        None => {
            warn!("SMTP is not configured; verification links will be logged instead of sent");
            Arc::new(LogMailer)
        }
    };

    let mut llm = LlmClient::new(config.openai_api_key.clone(), config.openai_model.clone())?;
    if let Some(url) = &config.openai_base_url {
        llm = llm.with_base_url(url);
    }
    if llm.is_configured() {
        info!("LLM client initialized (model: {})", llm.model());
    } else {
        warn!("OPENAI_API_KEY is not set; AI routes will be unavailable");
    }

    let cors = CorsLayer::new()
        .allow_origin(config.cors_origin.parse::<HeaderValue>()?)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .expose_headers([
            CONTENT_DISPOSITION,
            RETRY_AFTER,
            HeaderName::from_static("x-ratelimit-limit"),
            HeaderName::from_static("x-ratelimit-remaining"),
            HeaderName::from_static("x-ratelimit-reset"),
        ])
        .allow_credentials(true);

    let state = AppState {
        users,
        analytics,
        tokens: TokenService::new(&config.jwt_secret),
        mailer,
        llm,
        templates: TemplateCatalog::new(),
        api_limiter: RateLimiter::new(counters.clone(), RateLimitPolicy::api(&config.rate_limit)),
        auth_limiter: RateLimiter::new(counters, RateLimitPolicy::auth(&config.rate_limit)),
        config: config.clone(),
        store_backend,
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
