//! Local response cache for successful GET relays.
//!
//! Entries are keyed by [`TargetRequest::cache_key`](crate::rewrite::TargetRequest::cache_key)
//! and live for the configured TTL. The cache is bounded: when full, expired
//! entries are swept first and then the oldest entry is evicted.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use hyper::Method;
use tokio::sync::Mutex;
use tracing::debug;

use crate::forwarder::UpstreamResponse;
use crate::headers;
use crate::types::CacheConfig;

#[derive(Debug)]
struct CacheEntry {
    response: UpstreamResponse,
    stored_at: Instant,
}

/// Bounded TTL cache of upstream responses.
#[derive(Debug)]
pub struct ResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
    max_entries: usize,
}

impl ResponseCache {
    /// Creates a cache from its configuration.
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: config.ttl,
            max_entries: config.max_entries,
        }
    }

    /// Whether the cache stores anything at all.
    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero() && self.max_entries > 0
    }

    /// Returns a fresh entry for `key`.
    pub async fn get(&self, key: &str) -> Option<UpstreamResponse> {
        self.get_at(key, Instant::now()).await
    }

    /// Like [`get`](Self::get) with an explicit clock.
    pub async fn get_at(&self, key: &str, now: Instant) -> Option<UpstreamResponse> {
        if !self.is_enabled() {
            return None;
        }
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if now.duration_since(entry.stored_at) < self.ttl => {
                Some(entry.response.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Stores `response` under `key`.
    pub async fn insert(&self, key: String, response: UpstreamResponse) {
        self.insert_at(key, response, Instant::now()).await;
    }

    /// Like [`insert`](Self::insert) with an explicit clock.
    pub async fn insert_at(&self, key: String, response: UpstreamResponse, now: Instant) {
        if !self.is_enabled() {
            return;
        }
        let mut entries = self.entries.lock().await;

        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            let ttl = self.ttl;
            entries.retain(|_, e| now.duration_since(e.stored_at) < ttl);

            if entries.len() >= self.max_entries
                && let Some(oldest) = entries
                    .iter()
                    .min_by_key(|(_, e)| e.stored_at)
                    .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
                debug!(key = %oldest, "Evicted oldest cached response");
            }
        }

        entries.insert(
            key,
            CacheEntry {
                response,
                stored_at: now,
            },
        );
    }

    /// Number of stored entries, fresh or not.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Returns `true` if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

/// Whether an upstream answer to `method` may be stored.
///
/// Only 2xx GET responses qualify, and never ones marked `no-store` or
/// `private` or ones that set cookies.
pub fn is_cacheable(method: &Method, response: &UpstreamResponse) -> bool {
    if *method != Method::GET || !response.status.is_success() {
        return false;
    }
    if response.headers.contains_key(headers::SET_COOKIE) {
        return false;
    }
    !response
        .headers
        .get_all(headers::CACHE_CONTROL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|d| d.trim().to_ascii_lowercase())
        .any(|d| d == "no-store" || d == "private")
}
