//! Client reputation tracking.
//!
//! Every policy rejection that counts against a client (see
//! [`GatewayError::affects_reputation`](crate::error::GatewayError::affects_reputation))
//! is recorded here. Escalation is progressive:
//!
//! - above half the block threshold the client must pass the browser challenge
//! - above the block threshold every request is refused
//! - after a cooldown without activity a blocked client is released with
//!   half of its violations forgiven
//!
//! The table is bounded: when more than `max_tracked` identities are known,
//! the least recently seen one is evicted.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::identity::ClientIdentity;
use crate::types::ReputationConfig;

/// One recorded violation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    /// Short reason, e.g. `rate_limited:burst`
    pub reason: String,
    /// When it was recorded
    pub at: Instant,
}

/// Public view of a client's record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reputation {
    /// Violations currently counted against the client
    pub violations: u32,
    /// Whether the client is refused outright
    pub blocked: bool,
    /// Last time a violation was recorded, if ever
    pub last_seen: Option<Instant>,
}

impl Reputation {
    fn clean() -> Self {
        Self {
            violations: 0,
            blocked: false,
            last_seen: None,
        }
    }
}

#[derive(Debug)]
struct ReputationRecord {
    violations: u32,
    last_seen: Instant,
    blocked: bool,
    history: VecDeque<Violation>,
}

impl ReputationRecord {
    fn new(now: Instant) -> Self {
        Self {
            violations: 0,
            last_seen: now,
            blocked: false,
            history: VecDeque::new(),
        }
    }

    /// Releases a blocked record once the cooldown has passed. Returns true if released.
    fn apply_cooldown(&mut self, now: Instant, config: &ReputationConfig) -> bool {
        if self.blocked && now.saturating_duration_since(self.last_seen) >= config.cooldown {
            self.blocked = false;
            self.violations /= 2;
            return true;
        }
        false
    }

    fn snapshot(&self) -> Reputation {
        Reputation {
            violations: self.violations,
            blocked: self.blocked,
            last_seen: Some(self.last_seen),
        }
    }
}

/// Process-wide reputation table.
#[derive(Debug)]
pub struct ReputationTracker {
    config: ReputationConfig,
    records: Mutex<HashMap<String, ReputationRecord>>,
}

impl ReputationTracker {
    /// Creates an empty tracker.
    pub fn new(config: ReputationConfig) -> Self {
        Self {
            config,
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the configuration in use.
    pub fn config(&self) -> &ReputationConfig {
        &self.config
    }

    /// Records a violation against `identity`.
    pub async fn record_violation(&self, identity: &ClientIdentity, reason: &str) -> Reputation {
        self.record_violation_at(identity, reason, Instant::now()).await
    }

    /// Records a violation at `now`.
    pub async fn record_violation_at(
        &self,
        identity: &ClientIdentity,
        reason: &str,
        now: Instant,
    ) -> Reputation {
        let mut records = self.records.lock().await;
        let record = records
            .entry(identity.as_str().to_string())
            .or_insert_with(|| ReputationRecord::new(now));

        if record.apply_cooldown(now, &self.config) {
            info!(client = %identity, violations = record.violations, "Client unblocked after cooldown");
        }

        record.violations = record.violations.saturating_add(1);
        record.last_seen = now;
        record.history.push_back(Violation {
            reason: reason.to_string(),
            at: now,
        });
        while record.history.len() > self.config.history_len {
            record.history.pop_front();
        }

        if !record.blocked && record.violations > self.config.block_threshold {
            record.blocked = true;
            warn!(client = %identity, violations = record.violations, "Client blocked");
        }

        let snapshot = record.snapshot();
        evict_least_recent(&mut records, self.config.max_tracked);
        snapshot
    }

    /// Returns the current record, releasing an expired block first.
    pub async fn get_reputation(&self, identity: &ClientIdentity) -> Reputation {
        self.get_reputation_at(identity, Instant::now()).await
    }

    /// Returns the record as of `now`.
    pub async fn get_reputation_at(&self, identity: &ClientIdentity, now: Instant) -> Reputation {
        let mut records = self.records.lock().await;
        match records.get_mut(identity.as_str()) {
            Some(record) => {
                if record.apply_cooldown(now, &self.config) {
                    info!(client = %identity, violations = record.violations, "Client unblocked after cooldown");
                }
                record.snapshot()
            }
            None => Reputation::clean(),
        }
    }

    /// Returns true if the client must pass the browser challenge.
    pub async fn should_challenge(&self, identity: &ClientIdentity) -> bool {
        self.should_challenge_at(identity, Instant::now()).await
    }

    /// Challenge decision as of `now`.
    pub async fn should_challenge_at(&self, identity: &ClientIdentity, now: Instant) -> bool {
        self.get_reputation_at(identity, now).await.violations > self.config.challenge_threshold()
    }

    /// Recent violation reasons for `identity`, oldest first.
    pub async fn history(&self, identity: &ClientIdentity) -> Vec<Violation> {
        self.records
            .lock()
            .await
            .get(identity.as_str())
            .map(|r| r.history.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of tracked identities.
    pub async fn tracked_count(&self) -> usize {
        self.records.lock().await.len()
    }

    /// Identities currently blocked, sorted.
    pub async fn blocked_clients(&self) -> Vec<String> {
        let mut blocked: Vec<String> = self
            .records
            .lock()
            .await
            .iter()
            .filter(|(_, r)| r.blocked)
            .map(|(k, _)| k.clone())
            .collect();
        blocked.sort();
        blocked
    }
}

fn evict_least_recent(records: &mut HashMap<String, ReputationRecord>, max_tracked: usize) {
    while records.len() > max_tracked {
        let Some(oldest) = records
            .iter()
            .min_by_key(|(_, r)| r.last_seen)
            .map(|(k, _)| k.clone())
        else {
            return;
        };
        records.remove(&oldest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(block_threshold: u32, max_tracked: usize) -> ReputationConfig {
        ReputationConfig {
            block_threshold,
            cooldown: Duration::from_secs(3600),
            max_tracked,
            history_len: 3,
        }
    }

    fn id(s: &str) -> ClientIdentity {
        ClientIdentity::new(s)
    }

    #[tokio::test]
    async fn test_untracked_client_is_clean() {
        let tracker = ReputationTracker::new(config(200, 1000));
        let rep = tracker.get_reputation(&id("1.2.3.4")).await;
        assert_eq!(rep, Reputation::clean());
        assert!(!tracker.should_challenge(&id("1.2.3.4")).await);
    }

    #[tokio::test]
    async fn test_violations_accumulate() {
        let tracker = ReputationTracker::new(config(200, 1000));
        for _ in 0..5 {
            tracker.record_violation(&id("a"), "unauthorized").await;
        }
        let rep = tracker.get_reputation(&id("a")).await;
        assert_eq!(rep.violations, 5);
        assert!(!rep.blocked);
    }

    #[tokio::test]
    async fn test_blocked_only_above_threshold() {
        let tracker = ReputationTracker::new(config(200, 1000));
        let now = Instant::now();

        for _ in 0..200 {
            tracker.record_violation_at(&id("a"), "x", now).await;
        }
        assert!(!tracker.get_reputation_at(&id("a"), now).await.blocked);

        let rep = tracker.record_violation_at(&id("a"), "x", now).await;
        assert_eq!(rep.violations, 201);
        assert!(rep.blocked);
    }

    #[tokio::test]
    async fn test_cooldown_unblocks_and_halves() {
        let tracker = ReputationTracker::new(config(200, 1000));
        let start = Instant::now();

        for _ in 0..201 {
            tracker.record_violation_at(&id("a"), "x", start).await;
        }
        assert!(tracker.get_reputation_at(&id("a"), start).await.blocked);

        let almost = start + Duration::from_secs(3599);
        assert!(tracker.get_reputation_at(&id("a"), almost).await.blocked);

        let later = start + Duration::from_secs(3600);
        let rep = tracker.get_reputation_at(&id("a"), later).await;
        assert!(!rep.blocked);
        assert_eq!(rep.violations, 100);
    }

    #[tokio::test]
    async fn test_challenge_above_half_threshold() {
        let tracker = ReputationTracker::new(config(10, 1000));
        let now = Instant::now();

        for _ in 0..5 {
            tracker.record_violation_at(&id("a"), "x", now).await;
        }
        assert!(!tracker.should_challenge_at(&id("a"), now).await);

        tracker.record_violation_at(&id("a"), "x", now).await;
        assert!(tracker.should_challenge_at(&id("a"), now).await);
    }

    #[tokio::test]
    async fn test_history_bounded() {
        let tracker = ReputationTracker::new(config(200, 1000));
        for reason in ["one", "two", "three", "four"] {
            tracker.record_violation(&id("a"), reason).await;
        }
        let reasons: Vec<_> = tracker
            .history(&id("a"))
            .await
            .into_iter()
            .map(|v| v.reason)
            .collect();
        assert_eq!(reasons, vec!["two", "three", "four"]);
    }

    #[tokio::test]
    async fn test_evicts_least_recently_seen() {
        let tracker = ReputationTracker::new(config(200, 2));
        let t0 = Instant::now();

        tracker.record_violation_at(&id("a"), "x", t0).await;
        tracker
            .record_violation_at(&id("b"), "x", t0 + Duration::from_secs(1))
            .await;
        tracker
            .record_violation_at(&id("a"), "x", t0 + Duration::from_secs(2))
            .await;
        tracker
            .record_violation_at(&id("c"), "x", t0 + Duration::from_secs(3))
            .await;

        assert_eq!(tracker.tracked_count().await, 2);
        assert_eq!(tracker.get_reputation(&id("b")).await.violations, 0);
        assert_eq!(tracker.get_reputation(&id("a")).await.violations, 2);
        assert_eq!(tracker.get_reputation(&id("c")).await.violations, 1);
    }

    #[tokio::test]
    async fn test_blocked_clients_listing() {
        let tracker = ReputationTracker::new(config(1, 1000));
        for who in ["b", "a"] {
            tracker.record_violation(&id(who), "x").await;
            tracker.record_violation(&id(who), "x").await;
        }
        tracker.record_violation(&id("c"), "x").await;
        assert_eq!(tracker.blocked_clients().await, vec!["a", "b"]);
    }
}
