//! Process-wide request counters for the `/_stats` endpoint.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Monotonic counters, updated lock-free.
#[derive(Debug, Default)]
pub struct Stats {
    requests: AtomicU64,
    proxied: AtomicU64,
    rejected: AtomicU64,
    cache_hits: AtomicU64,
}

/// Point-in-time copy of [`Stats`] plus reputation figures.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub requests: u64,
    pub proxied: u64,
    pub rejected: u64,
    pub cache_hits: u64,
    pub tracked_clients: usize,
    pub blocked_clients: Vec<String>,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_proxied(&self) {
        self.proxied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Copies the counters; reputation fields are filled in by the caller.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            proxied: self.proxied.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            ..StatsSnapshot::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_json_shape() {
        let stats = Stats::new();
        stats.record_request();
        stats.record_request();
        stats.record_proxied();
        stats.record_rejected();
        stats.record_cache_hit();

        let mut snapshot = stats.snapshot();
        snapshot.tracked_clients = 3;
        snapshot.blocked_clients = vec!["203.0.113.7".to_string()];

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["requests"], 2);
        assert_eq!(json["proxied"], 1);
        assert_eq!(json["rejected"], 1);
        assert_eq!(json["cache_hits"], 1);
        assert_eq!(json["tracked_clients"], 3);
        assert_eq!(json["blocked_clients"][0], "203.0.113.7");
    }
}
