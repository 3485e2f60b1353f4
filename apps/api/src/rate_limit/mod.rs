//! Fixed-window rate limiting keyed by route group and client IP.
//!
//! The counter store is a trait object so a single process can count in memory
//! while a multi-instance deployment shares counters through Redis.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::RateLimitSettings;
use crate::errors::AppError;

pub mod memory;
pub mod redis_store;

pub use memory::MemoryRateLimitStore;
pub use redis_store::RedisRateLimitStore;

const LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const RESET_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-reset");

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// State of one counter after recording a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowHit {
    /// Requests seen in the current window, including this one.
    pub count: u64,
    /// Time until the window closes and the counter resets.
    pub reset_after: Duration,
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Records one request under `key`, opening a new window of length `window`
    /// if none is active.
    async fn hit(&self, key: &str, window: Duration) -> Result<WindowHit, RateLimitError>;
}

#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    pub group: &'static str,
    pub max_requests: u64,
    pub window: Duration,
}

impl RateLimitPolicy {
    /// `/api/auth/*`
    pub fn auth(settings: &RateLimitSettings) -> Self {
        Self {
            group: "auth",
            max_requests: settings.auth_max_requests,
            window: Duration::from_secs(settings.window_secs),
        }
    }

    /// Every other `/api/*` route except health.
    pub fn api(settings: &RateLimitSettings) -> Self {
        Self {
            group: "api",
            max_requests: settings.api_max_requests,
            window: Duration::from_secs(settings.window_secs),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitStatus {
    pub limit: u64,
    pub remaining: u64,
    pub reset_after: Duration,
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    policy: RateLimitPolicy,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, policy: RateLimitPolicy) -> Self {
        Self { store, policy }
    }

    /// Counts a request from `client` and rejects it once the window's cap is exceeded.
    ///
    /// A failing counter store lets the request through.
    pub async fn check(&self, client: &str) -> Result<RateLimitStatus, AppError> {
        let key = format!("{}:{client}", self.policy.group);
        let hit = match self.store.hit(&key, self.policy.window).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(group = self.policy.group, "Rate limit store unavailable: {e}");
                return Ok(RateLimitStatus {
                    limit: self.policy.max_requests,
                    remaining: self.policy.max_requests,
                    reset_after: self.policy.window,
                });
            }
        };

        if hit.count > self.policy.max_requests {
            debug!(group = self.policy.group, %client, count = hit.count, "Rate limit exceeded");
            return Err(AppError::RateLimited {
                group: self.policy.group.to_string(),
                retry_after_secs: hit.reset_after.as_secs().max(1),
            });
        }

        Ok(RateLimitStatus {
            limit: self.policy.max_requests,
            remaining: self.policy.max_requests - hit.count,
            reset_after: hit.reset_after,
        })
    }
}

/// Axum middleware: `middleware::from_fn_with_state(limiter, enforce_rate_limit)`.
pub async fn enforce_rate_limit(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let client = client_ip(request.headers(), request.extensions().get());
    let status = limiter.check(&client).await?;

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(LIMIT_HEADER, HeaderValue::from(status.limit));
    headers.insert(REMAINING_HEADER, HeaderValue::from(status.remaining));
    headers.insert(RESET_HEADER, HeaderValue::from(status.reset_after.as_secs()));
    Ok(response)
}

/// First `X-Forwarded-For` hop, else the peer address, else `"unknown"`.
pub fn client_ip(headers: &HeaderMap, peer: Option<&ConnectInfo<SocketAddr>>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    match (forwarded, peer) {
        (Some(ip), _) => ip.to_string(),
        (None, Some(ConnectInfo(addr))) => addr.ip().to_string(),
        (None, None) => "unknown".to_string(),
    }
}
