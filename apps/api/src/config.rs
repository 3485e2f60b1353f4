use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub cors_origin: String,
    /// Base URL used to build the links inside verification emails.
    pub frontend_url: String,
    pub jwt_secret: String,
    /// When set, users and analytics live in PostgreSQL instead of JSON files.
    pub database_url: Option<String>,
    pub data_dir: PathBuf,
    /// When set, rate-limit counters are shared through Redis.
    pub redis_url: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    /// Chat-completions endpoint; OpenAI's when unset.
    pub openai_base_url: Option<String>,
    pub smtp: Option<SmtpConfig>,
    pub rate_limit: RateLimitSettings,
    pub rust_log: String,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

/// Fixed-window limits. The auth group is the tighter one.
#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub window_secs: u64,
    pub api_max_requests: u64,
    pub auth_max_requests: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            window_secs: 15 * 60,
            api_max_requests: 100,
            auth_max_requests: 10,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let cors_origin = optional_env("CORS_ORIGIN")
            .unwrap_or_else(|| "http://localhost:5173".to_string());
        let defaults = RateLimitSettings::default();

        Ok(Config {
            port: parse_env("PORT", 3001)?,
            frontend_url: optional_env("FRONTEND_URL").unwrap_or_else(|| cors_origin.clone()),
            cors_origin,
            jwt_secret: require_env("JWT_SECRET")?,
            database_url: optional_env("DATABASE_URL"),
            data_dir: optional_env("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data")),
            redis_url: optional_env("REDIS_URL"),
            openai_api_key: optional_env("OPENAI_API_KEY"),
            openai_model: optional_env("OPENAI_MODEL")
                .unwrap_or_else(|| crate::llm_client::DEFAULT_MODEL.to_string()),
            openai_base_url: optional_env("OPENAI_BASE_URL"),
            smtp: smtp_from_env()?,
            rate_limit: RateLimitSettings {
                window_secs: parse_env("RATE_LIMIT_WINDOW_SECS", defaults.window_secs)?,
                api_max_requests: parse_env("RATE_LIMIT_MAX", defaults.api_max_requests)?,
                auth_max_requests: parse_env("AUTH_RATE_LIMIT_MAX", defaults.auth_max_requests)?,
            },
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

/// SMTP is enabled only when host and credentials are all present.
fn smtp_from_env() -> Result<Option<SmtpConfig>> {
    let (Some(host), Some(username), Some(password)) = (
        optional_env("SMTP_HOST"),
        optional_env("SMTP_USER"),
        optional_env("SMTP_PASS"),
    ) else {
        return Ok(None);
    };

    Ok(Some(SmtpConfig {
        port: parse_env("SMTP_PORT", 587)?,
        from: optional_env("SMTP_FROM").unwrap_or_else(|| username.clone()),
        host,
        username,
        password,
    }))
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value: '{raw}'")),
        None => Ok(default),
    }
}
