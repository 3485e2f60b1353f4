use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{RateLimitError, RateLimitStore, WindowHit};

/// Expired windows are swept once the map grows past this many keys.
const SWEEP_THRESHOLD: usize = 10_000;
/// Minimum time between two sweeps.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct Window {
    count: u64,
    resets_at: Instant,
}

struct Windows {
    entries: HashMap<String, Window>,
    next_sweep: Instant,
}

/// Process-local counters. Lost on restart and not shared between instances.
pub struct MemoryRateLimitStore {
    windows: Mutex<Windows>,
    sweep_threshold: usize,
}

impl Default for MemoryRateLimitStore {
    fn default() -> Self {
        Self::with_sweep_threshold(SWEEP_THRESHOLD)
    }
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_sweep_threshold(sweep_threshold: usize) -> Self {
        Self {
            windows: Mutex::new(Windows {
                entries: HashMap::new(),
                next_sweep: Instant::now(),
            }),
            sweep_threshold,
        }
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn hit(&self, key: &str, window: Duration) -> Result<WindowHit, RateLimitError> {
        let now = Instant::now();
        // Poisoning only happens if a panic occurred while holding the lock;
        // the map itself is still consistent.
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());

        if windows.entries.len() > self.sweep_threshold && now >= windows.next_sweep {
            windows.entries.retain(|_, w| w.resets_at > now);
            windows.next_sweep = now + SWEEP_INTERVAL;
        }

        let entry = windows.entries.entry(key.to_string()).or_insert(Window {
            count: 0,
            resets_at: now + window,
        });
        if entry.resets_at <= now {
            entry.count = 0;
            entry.resets_at = now + window;
        }
        entry.count += 1;

        Ok(WindowHit {
            count: entry.count,
            reset_after: entry.resets_at - now,
        })
    }
}
