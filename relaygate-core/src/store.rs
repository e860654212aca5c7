//! Counter store for rate-limit windows.
//!
//! The limiter counts requests through [`CounterStore::increment`], which
//! reads, advances and writes a [`WindowCounter`] as one step. Backends that
//! can do this atomically (a lock, a server-side script) override it; the
//! default composes `get` and `put` and is only exact for a single writer.
//! Any error a store returns is treated by the limiter as "no data" rather
//! than as a reason to reject traffic.
//!
//! # Memory Management
//!
//! [`MemoryCounterStore`] gives every entry an expiry equal to the TTL it was
//! written with. Expired entries are ignored on read and swept when:
//! - Entry count exceeds the configured threshold
//! - Minimum interval since last sweep has passed

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::types::RateLimitCleanupConfig;

/// Fixed-window request counter for one key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowCounter {
    /// Requests counted in the current window
    pub count: u32,
    /// Window start, milliseconds since the Unix epoch
    pub window_start_ms: u64,
}

impl WindowCounter {
    /// A window opened at `now_ms` holding one request.
    pub fn first(now_ms: u64) -> Self {
        Self {
            count: 1,
            window_start_ms: now_ms,
        }
    }

    /// Returns true once more than `window` has passed since the window opened.
    pub fn is_expired(&self, now_ms: u64, window: Duration) -> bool {
        now_ms.saturating_sub(self.window_start_ms) > window.as_millis() as u64
    }

    /// The counter after one more request at `now_ms`.
    ///
    /// Opens a new window when nothing is stored or the stored window expired.
    pub fn advance(stored: Option<Self>, now_ms: u64, window: Duration) -> Self {
        match stored {
            Some(c) if !c.is_expired(now_ms, window) => Self {
                count: c.count.saturating_add(1),
                window_start_ms: c.window_start_ms,
            },
            _ => Self::first(now_ms),
        }
    }
}

/// Errors from a counter store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached.
    #[error("counter store unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be decoded.
    #[error("corrupt counter entry: {0}")]
    Corrupt(String),
}

/// Key-value storage for window counters, with per-entry TTL.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Loads the counter stored under `key`, if any and not expired.
    async fn get(&self, key: &str) -> Result<Option<WindowCounter>, StoreError>;

    /// Stores `counter` under `key`, expiring after `ttl`.
    async fn put(&self, key: &str, counter: WindowCounter, ttl: Duration) -> Result<(), StoreError>;

    /// Counts one request against `key` and returns the advanced counter.
    ///
    /// The advanced counter is stored, with `window` as its TTL, only while
    /// its count stays within `limit`. An over-limit attempt leaves the stored
    /// counter untouched, so rejected traffic never extends a window.
    async fn increment(
        &self,
        key: &str,
        now_ms: u64,
        window: Duration,
        limit: u32,
    ) -> Result<WindowCounter, StoreError> {
        let next = WindowCounter::advance(self.get(key).await?, now_ms, window);
        if next.count <= limit {
            self.put(key, next, window).await?;
        }
        Ok(next)
    }

    /// Number of live entries, when the backend can tell cheaply.
    async fn len(&self) -> Option<usize> {
        None
    }
}

#[derive(Debug)]
struct StoredCounter {
    counter: WindowCounter,
    expires_at: Instant,
}

/// In-process counter store for single-node deployments.
#[derive(Debug)]
pub struct MemoryCounterStore {
    entries: Mutex<HashMap<String, StoredCounter>>,
    cleanup: RateLimitCleanupConfig,
    last_cleanup: Mutex<Option<Instant>>,
}

impl MemoryCounterStore {
    /// Creates an empty store swept according to `cleanup`.
    pub fn new(cleanup: RateLimitCleanupConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            cleanup,
            last_cleanup: Mutex::new(None),
        }
    }

    /// Removes expired entries if the threshold and interval allow it.
    async fn maybe_sweep(&self, entries: &mut HashMap<String, StoredCounter>, now: Instant) {
        if !self.cleanup.is_enabled() || entries.len() <= self.cleanup.threshold {
            return;
        }

        let should_sweep = {
            let mut last = self.last_cleanup.lock().await;
            match *last {
                Some(previous) if now.duration_since(previous) < self.cleanup.interval => false,
                _ => {
                    *last = Some(now);
                    true
                }
            }
        };

        if should_sweep {
            let before = entries.len();
            entries.retain(|_, stored| stored.expires_at > now);
            let removed = before - entries.len();
            if removed > 0 {
                debug!(
                    removed_entries = removed,
                    remaining_entries = entries.len(),
                    "Counter store cleanup completed"
                );
            }
        }
    }
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::new(RateLimitCleanupConfig {
            threshold: crate::defaults::RATE_LIMIT_CLEANUP_THRESHOLD,
            interval: crate::defaults::RATE_LIMIT_CLEANUP_INTERVAL,
        })
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn get(&self, key: &str) -> Result<Option<WindowCounter>, StoreError> {
        let entries = self.entries.lock().await;
        let now = Instant::now();
        Ok(entries
            .get(key)
            .filter(|stored| stored.expires_at > now)
            .map(|stored| stored.counter))
    }

    async fn put(&self, key: &str, counter: WindowCounter, ttl: Duration) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        self.maybe_sweep(&mut entries, now).await;
        entries.insert(
            key.to_string(),
            StoredCounter {
                counter,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn increment(
        &self,
        key: &str,
        now_ms: u64,
        window: Duration,
        limit: u32,
    ) -> Result<WindowCounter, StoreError> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let stored = entries
            .get(key)
            .filter(|stored| stored.expires_at > now)
            .map(|stored| stored.counter);

        let next = WindowCounter::advance(stored, now_ms, window);
        if next.count <= limit {
            self.maybe_sweep(&mut entries, now).await;
            entries.insert(
                key.to_string(),
                StoredCounter {
                    counter: next,
                    expires_at: now + window,
                },
            );
        }
        Ok(next)
    }

    async fn len(&self) -> Option<usize> {
        Some(self.entries.lock().await.len())
    }
}
