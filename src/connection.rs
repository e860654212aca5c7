//! Connection management utilities for RelayGate.
//!
//! This module provides:
//! - Connection admission against a concurrency cap
//! - Active connection tracking with RAII guards
//! - Graceful shutdown support

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Default)]
struct TrackerInner {
    active: AtomicUsize,
    idle: Notify,
}

/// Tracks active connections for graceful shutdown.
///
/// Each accepted connection holds a [`ConnectionGuard`]; the count drops when
/// the guard does, so early returns and panics in the connection task are
/// accounted for.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    inner: Arc<TrackerInner>,
}

/// Marks one live connection. Dropping it releases the slot.
#[derive(Debug)]
pub struct ConnectionGuard {
    inner: Arc<TrackerInner>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if self.inner.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}

impl ConnectionTracker {
    /// Create a new connection tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection until the returned guard is dropped.
    pub fn track(&self) -> ConnectionGuard {
        self.inner.active.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            inner: self.inner.clone(),
        }
    }

    /// Get current active connection count.
    pub fn count(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Wait for all connections to finish with timeout.
    /// Returns true if all connections finished, false if timeout reached.
    pub async fn wait_for_shutdown(&self, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.inner.idle.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if self.count() == 0 {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }
}

/// Outcome of asking the limiter for a connection slot.
#[derive(Debug)]
pub enum Admission {
    /// No cap is configured.
    Unlimited,
    /// A slot was reserved; it is released when the permit drops.
    Permit(OwnedSemaphorePermit),
    /// Every slot is taken.
    AtCapacity,
}

impl Admission {
    /// `true` unless the limiter is full.
    pub fn is_admitted(&self) -> bool {
        !matches!(self, Self::AtCapacity)
    }
}

/// Caps the number of concurrently served connections.
#[derive(Debug, Clone)]
pub struct ConnectionLimiter {
    semaphore: Option<Arc<Semaphore>>,
    max_connections: usize,
}

impl ConnectionLimiter {
    /// Create a new connection limiter.
    /// If max_connections is 0, no limit is enforced.
    pub fn new(max_connections: usize) -> Self {
        let semaphore = (max_connections > 0).then(|| Arc::new(Semaphore::new(max_connections)));

        Self {
            semaphore,
            max_connections,
        }
    }

    /// Check if connection limiting is enabled.
    pub fn is_enabled(&self) -> bool {
        self.semaphore.is_some()
    }

    /// Get the maximum number of connections (0 means unlimited).
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Reserves a slot without waiting.
    pub fn try_admit(&self) -> Admission {
        match &self.semaphore {
            None => Admission::Unlimited,
            Some(sem) => match sem.clone().try_acquire_owned() {
                Ok(permit) => Admission::Permit(permit),
                Err(_) => Admission::AtCapacity,
            },
        }
    }
}
