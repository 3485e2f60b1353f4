use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tracing::info;

use super::{RateLimitError, RateLimitStore, WindowHit};

const KEY_PREFIX: &str = "ratelimit:";

/// Counters shared by every instance pointed at the same Redis.
///
/// Each hit runs `SET key 0 PX window NX; INCR key; PTTL key` in one MULTI block,
/// so the first request of a window sets the expiry and later ones never extend it.
#[derive(Clone)]
pub struct RedisRateLimitStore {
    conn: MultiplexedConnection,
}

impl RedisRateLimitStore {
    pub async fn connect(redis_url: &str) -> Result<Self, RateLimitError> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_multiplexed_tokio_connection().await?;
        info!("Redis rate-limit store connected");
        Ok(Self { conn })
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn hit(&self, key: &str, window: Duration) -> Result<WindowHit, RateLimitError> {
        let key = format!("{KEY_PREFIX}{key}");
        let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        let mut conn = self.conn.clone();

        let (count, ttl_ms): (u64, i64) = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(&key)
            .arg(0)
            .arg("PX")
            .arg(window_ms)
            .arg("NX")
            .ignore()
            .incr(&key, 1)
            .pttl(&key)
            .query_async(&mut conn)
            .await?;

        // PTTL is negative only if the key vanished between commands; treat as a fresh window.
        let reset_after = u64::try_from(ttl_ms)
            .map(Duration::from_millis)
            .unwrap_or(window);

        Ok(WindowHit { count, reset_after })
    }
}
