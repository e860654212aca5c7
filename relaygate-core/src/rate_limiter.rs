//! Rate limiting for RelayGate.
//!
//! Three independent fixed-window tiers are evaluated in order, and the
//! first tier to reject short-circuits the rest:
//!
//! | tier   | key             | default     |
//! |--------|-----------------|-------------|
//! | burst  | client identity | 10 / 1 s    |
//! | client | client identity | 60 / 60 s   |
//! | global | shared          | 1000 / 60 s |
//!
//! # Algorithm
//!
//! For each tier, [`CounterStore::increment`] advances the counter for the
//! key in one step: a new window opens if the stored one is missing or more
//! than one window old, otherwise the count grows by one. The request is
//! rejected when the advanced count exceeds the limit, and rejected attempts
//! are not stored.
//!
//! # Consistency
//!
//! The increment is awaited before the request is admitted, and the
//! in-memory store performs it under a single lock, so concurrent requests
//! for the same key are serialized and at most `max_requests` are admitted
//! per window. A failing store never rejects traffic: errors are logged and
//! the request is admitted.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::error::{GatewayError, RateLimitTier, Result};
use crate::identity::ClientIdentity;
use crate::store::{CounterStore, MemoryCounterStore};
use crate::types::{RateLimitCleanupConfig, RateLimitConfig, RateLimitingProvider};

/// Key of the shared global counter.
const GLOBAL_KEY: &str = "global:*";

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Three-tier rate limiter over a [`CounterStore`].
///
/// Cheap to clone; clones share the store.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
}

impl RateLimiter {
    /// Creates a limiter over the given store.
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    /// Creates a limiter over a fresh in-process store.
    pub fn in_memory(cleanup: RateLimitCleanupConfig) -> Self {
        Self::new(Arc::new(MemoryCounterStore::new(cleanup)))
    }

    /// Returns the underlying counter store.
    pub fn store(&self) -> &Arc<dyn CounterStore> {
        &self.store
    }

    /// Checks all tiers for `identity` at the current time.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::RateLimited`] naming the first tier that rejected.
    pub async fn check(
        &self,
        identity: &ClientIdentity,
        config: &impl RateLimitingProvider,
    ) -> Result<()> {
        self.check_at(identity, config, now_ms()).await
    }

    /// Checks all tiers for `identity` at `now_ms`.
    pub async fn check_at(
        &self,
        identity: &ClientIdentity,
        config: &impl RateLimitingProvider,
        now_ms: u64,
    ) -> Result<()> {
        for tier in RateLimitTier::ORDERED {
            let (key, limit) = match tier {
                RateLimitTier::Burst => (
                    format!("{tier}:{identity}"),
                    config.burst_limit_config(),
                ),
                RateLimitTier::PerClient => (
                    format!("{tier}:{identity}"),
                    config.client_limit_config(),
                ),
                RateLimitTier::Global => (GLOBAL_KEY.to_string(), config.global_limit_config()),
            };
            self.check_tier(tier, key, limit, now_ms).await?;
        }
        debug!(client = %identity, "Rate limit check passed");
        Ok(())
    }

    async fn check_tier(
        &self,
        tier: RateLimitTier,
        key: String,
        limit: &RateLimitConfig,
        now_ms: u64,
    ) -> Result<()> {
        let counter = match self
            .store
            .increment(&key, now_ms, limit.window_duration, limit.max_requests)
            .await
        {
            Ok(counter) => counter,
            Err(e) => {
                warn!(tier = %tier, error = %e, "Counter store unavailable, admitting");
                return Ok(());
            }
        };

        if counter.count > limit.max_requests {
            return Err(GatewayError::RateLimited {
                tier,
                window_secs: window_secs(limit.window_duration),
            });
        }
        Ok(())
    }
}

/// Whole seconds for `retry-after`, at least one.
fn window_secs(window: Duration) -> u64 {
    window.as_secs().max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{StoreError, WindowCounter};
    use crate::test_utils::TestConfig;
    use async_trait::async_trait;

    fn limiter() -> RateLimiter {
        RateLimiter::in_memory(RateLimitCleanupConfig {
            threshold: 0,
            interval: Duration::from_secs(60),
        })
    }

    fn id(s: &str) -> ClientIdentity {
        ClientIdentity::new(s)
    }

    async fn hit(limiter: &RateLimiter, who: &str, config: &TestConfig, now: u64) -> Result<()> {
        limiter.check_at(&id(who), config, now).await
    }

    // ===========================================
    // Basic rate limiting tests
    // ===========================================

    #[tokio::test]
    async fn test_first_request_allowed() {
        let limiter = limiter();
        let config = TestConfig::new();
        assert!(hit(&limiter, "192.168.1.1", &config, 1_000).await.is_ok());
    }

    #[tokio::test]
    async fn test_burst_eleventh_request_rejected() {
        let limiter = limiter();
        let config = TestConfig::new();

        for i in 0..10 {
            let result = hit(&limiter, "203.0.113.7", &config, 1_000 + i).await;
            assert!(result.is_ok(), "Request {} should be allowed", i + 1);
        }

        let err = hit(&limiter, "203.0.113.7", &config, 1_500)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::RateLimited {
                tier: RateLimitTier::Burst,
                window_secs: 1
            }
        ));
    }

    #[tokio::test]
    async fn test_burst_window_resets_after_window() {
        let limiter = limiter();
        let config = TestConfig::new().with_burst_limit(2, 1);

        assert!(hit(&limiter, "a", &config, 0).await.is_ok());
        assert!(hit(&limiter, "a", &config, 10).await.is_ok());
        assert!(hit(&limiter, "a", &config, 20).await.is_err());
        // Exactly one window later is still the same window.
        assert!(hit(&limiter, "a", &config, 1_000).await.is_err());
        assert!(hit(&limiter, "a", &config, 1_001).await.is_ok());
    }

    #[tokio::test]
    async fn test_per_client_tier() {
        let limiter = limiter();
        let config = TestConfig::new().with_client_limit(3, 60);

        // Spread over several burst windows so only the per-client tier counts.
        for i in 0..3 {
            assert!(hit(&limiter, "a", &config, i * 2_000).await.is_ok());
        }
        let err = hit(&limiter, "a", &config, 8_000).await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::RateLimited {
                tier: RateLimitTier::PerClient,
                window_secs: 60
            }
        ));
    }

    #[tokio::test]
    async fn test_global_tier_spans_clients() {
        let limiter = limiter();
        let config = TestConfig::new().with_global_limit(3, 60);

        assert!(hit(&limiter, "a", &config, 0).await.is_ok());
        assert!(hit(&limiter, "b", &config, 0).await.is_ok());
        assert!(hit(&limiter, "c", &config, 0).await.is_ok());
        let err = hit(&limiter, "d", &config, 0).await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::RateLimited {
                tier: RateLimitTier::Global,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_different_clients_independent() {
        let limiter = limiter();
        let config = TestConfig::new().with_burst_limit(2, 1);

        assert!(hit(&limiter, "192.168.1.1", &config, 0).await.is_ok());
        assert!(hit(&limiter, "192.168.1.1", &config, 0).await.is_ok());
        assert!(hit(&limiter, "192.168.1.1", &config, 0).await.is_err());

        assert!(hit(&limiter, "2001:db8::1", &config, 0).await.is_ok());
        assert!(hit(&limiter, "2001:db8::1", &config, 0).await.is_ok());
    }

    #[tokio::test]
    async fn test_counter_monotonic_within_window() {
        let limiter = limiter();
        let config = TestConfig::new().with_burst_limit(3, 1);

        for expected in 1..=3 {
            hit(&limiter, "a", &config, 100).await.unwrap();
            let stored = limiter.store().get("burst:a").await.unwrap().unwrap();
            assert_eq!(stored.count, expected);
        }

        // Rejected attempts are not persisted, the stored count stays at the limit.
        let _ = hit(&limiter, "a", &config, 200).await;
        let stored = limiter.store().get("burst:a").await.unwrap().unwrap();
        assert_eq!(stored.count, 3);
        assert_eq!(stored.window_start_ms, 100);
    }

    #[tokio::test]
    async fn test_rejection_short_circuits_later_tiers() {
        let limiter = limiter();
        let config = TestConfig::new().with_burst_limit(1, 1);

        hit(&limiter, "a", &config, 0).await.unwrap();
        let _ = hit(&limiter, "a", &config, 0).await;

        let client = limiter.store().get("client:a").await.unwrap().unwrap();
        let global = limiter.store().get(GLOBAL_KEY).await.unwrap().unwrap();
        assert_eq!(client.count, 1);
        assert_eq!(global.count, 1);
    }

    // ===========================================
    // Concurrency tests
    // ===========================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_burst_admits_exactly_limit() {
        let limiter = limiter();
        let config = Arc::new(TestConfig::new().with_burst_limit(10, 60));

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let limiter = limiter.clone();
                let config = config.clone();
                tokio::spawn(async move { limiter.check_at(&id("a"), &*config, 0).await })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 10);
        let stored = limiter.store().get("burst:a").await.unwrap().unwrap();
        assert_eq!(stored.count, 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_global_limit_across_clients() {
        let limiter = limiter();
        let config = Arc::new(TestConfig::new().with_global_limit(20, 60));

        let handles: Vec<_> = (0..60)
            .map(|i| {
                let limiter = limiter.clone();
                let config = config.clone();
                let who = format!("198.51.100.{i}");
                tokio::spawn(async move { limiter.check_at(&id(&who), &*config, 0).await })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 20);
    }

    // ===========================================
    // Fail-open tests
    // ===========================================

    struct BrokenStore;

    #[async_trait]
    impl CounterStore for BrokenStore {
        async fn get(&self, _key: &str) -> std::result::Result<Option<WindowCounter>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn put(
            &self,
            _key: &str,
            _counter: WindowCounter,
            _ttl: Duration,
        ) -> std::result::Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_open() {
        let limiter = RateLimiter::new(Arc::new(BrokenStore));
        let config = TestConfig::new().with_burst_limit(1, 1);

        for _ in 0..5 {
            assert!(hit(&limiter, "a", &config, 0).await.is_ok());
        }
    }

    #[test]
    fn test_window_secs_minimum_one() {
        assert_eq!(window_secs(Duration::from_millis(500)), 1);
        assert_eq!(window_secs(Duration::from_secs(60)), 60);
    }
}
