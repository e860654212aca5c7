//! DNS-based caller allow-list.
//!
//! A deployment may restrict callers to the single address a hostname
//! resolves to (e.g. a dynamic-DNS name of an office gateway). The resolved
//! address is cached for a TTL. A failed refresh keeps serving the last
//! known value for another TTL before the next attempt; only a name that was
//! never resolved fails the request.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::{GatewayError, Result};
use crate::identity::ClientIdentity;
use crate::types::AllowlistConfig;

/// Hostname-to-address capability.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolves `hostname` to one address.
    async fn resolve(&self, hostname: &str) -> std::result::Result<IpAddr, String>;
}

/// Resolver backed by the operating system (`getaddrinfo`).
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, hostname: &str) -> std::result::Result<IpAddr, String> {
        let mut addrs = tokio::net::lookup_host((hostname, 0))
            .await
            .map_err(|e| e.to_string())?;
        addrs
            .next()
            .map(|a| a.ip())
            .ok_or_else(|| "no addresses".to_string())
    }
}

#[derive(Clone, Copy, Debug)]
struct Resolved {
    ip: IpAddr,
    resolved_at: Instant,
}

/// Cached allow-list entry with stale-on-error refresh.
pub struct Allowlist {
    hostname: String,
    ttl: Duration,
    resolver: Arc<dyn Resolver>,
    cached: RwLock<Option<Resolved>>,
    refresh: Mutex<()>,
}

impl std::fmt::Debug for Allowlist {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Allowlist")
            .field("hostname", &self.hostname)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl Allowlist {
    /// Creates an allow-list that resolves through `resolver`.
    pub fn new(config: &AllowlistConfig, resolver: Arc<dyn Resolver>) -> Self {
        Self {
            hostname: config.hostname.clone(),
            ttl: config.ttl,
            resolver,
            cached: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    /// Hostname being resolved.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Last resolved address, without triggering a refresh.
    pub async fn cached_ip(&self) -> Option<IpAddr> {
        self.cached.read().await.map(|r| r.ip)
    }

    /// Returns the permitted address, refreshing it when stale.
    ///
    /// # Errors
    ///
    /// [`GatewayError::IdentityResolutionFailed`] when resolution fails and
    /// no earlier value exists.
    pub async fn allowed_ip(&self) -> Result<IpAddr> {
        self.allowed_ip_at(Instant::now()).await
    }

    /// Like [`allowed_ip`](Self::allowed_ip) with an explicit clock.
    pub async fn allowed_ip_at(&self, now: Instant) -> Result<IpAddr> {
        if let Some(ip) = self.fresh(now).await {
            return Ok(ip);
        }

        // One refresh at a time; latecomers reuse its result.
        let _guard = self.refresh.lock().await;
        if let Some(ip) = self.fresh(now).await {
            return Ok(ip);
        }

        match self.resolver.resolve(&self.hostname).await {
            Ok(ip) => {
                debug!(hostname = %self.hostname, ip = %ip, "Allow-list hostname resolved");
                *self.cached.write().await = Some(Resolved {
                    ip,
                    resolved_at: now,
                });
                Ok(ip)
            }
            Err(e) => match &mut *self.cached.write().await {
                Some(stale) => {
                    warn!(hostname = %self.hostname, error = %e, "Allow-list refresh failed, serving last known address");
                    stale.resolved_at = now;
                    Ok(stale.ip)
                }
                None => Err(GatewayError::IdentityResolutionFailed(format!(
                    "{}: {e}",
                    self.hostname
                ))),
            },
        }
    }

    async fn fresh(&self, now: Instant) -> Option<IpAddr> {
        self.cached
            .read()
            .await
            .filter(|r| now.saturating_duration_since(r.resolved_at) <= self.ttl)
            .map(|r| r.ip)
    }

    /// Admits `identity` only if it equals the permitted address.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::IdentityResolutionFailed`] as for [`allowed_ip`](Self::allowed_ip)
    /// - [`GatewayError::Unauthorized`] when the identity does not match
    pub async fn check(&self, identity: &ClientIdentity) -> Result<()> {
        let allowed = self.allowed_ip().await?;
        if matches(identity, allowed) {
            Ok(())
        } else {
            Err(GatewayError::Unauthorized(
                "caller not in allow-list".to_string(),
            ))
        }
    }
}

/// Compares an identity with an address, treating IPv4-mapped IPv6 as IPv4.
pub fn matches(identity: &ClientIdentity, allowed: IpAddr) -> bool {
    identity
        .as_str()
        .parse::<IpAddr>()
        .is_ok_and(|ip| ip.to_canonical() == allowed.to_canonical())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Resolver returning a fixed address until told to fail.
    struct ScriptedResolver {
        ip: IpAddr,
        failing: AtomicBool,
        calls: AtomicUsize,
    }

    impl ScriptedResolver {
        fn new(ip: &str) -> Arc<Self> {
            Arc::new(Self {
                ip: ip.parse().unwrap(),
                failing: AtomicBool::new(false),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            let r = Self::new("0.0.0.0");
            r.failing.store(true, Ordering::SeqCst);
            r
        }
    }

    #[async_trait]
    impl Resolver for ScriptedResolver {
        async fn resolve(&self, _hostname: &str) -> std::result::Result<IpAddr, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                Err("SERVFAIL".to_string())
            } else {
                Ok(self.ip)
            }
        }
    }

    fn config() -> AllowlistConfig {
        AllowlistConfig {
            hostname: "office.example.net".to_string(),
            ttl: Duration::from_secs(300),
        }
    }

    #[tokio::test]
    async fn test_resolution_cached_within_ttl() {
        let resolver = ScriptedResolver::new("203.0.113.7");
        let allowlist = Allowlist::new(&config(), resolver.clone());
        let t0 = Instant::now();

        assert_eq!(allowlist.allowed_ip_at(t0).await.unwrap().to_string(), "203.0.113.7");
        allowlist
            .allowed_ip_at(t0 + Duration::from_secs(300))
            .await
            .unwrap();
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);

        allowlist
            .allowed_ip_at(t0 + Duration::from_secs(301))
            .await
            .unwrap();
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stale_value_served_when_refresh_fails() {
        let resolver = ScriptedResolver::new("203.0.113.7");
        let allowlist = Allowlist::new(&config(), resolver.clone());
        let t0 = Instant::now();
        allowlist.allowed_ip_at(t0).await.unwrap();

        resolver.failing.store(true, Ordering::SeqCst);
        let ip = allowlist
            .allowed_ip_at(t0 + Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(ip.to_string(), "203.0.113.7");
    }

    #[tokio::test]
    async fn test_failed_refresh_waits_a_ttl_before_retrying() {
        let resolver = ScriptedResolver::new("203.0.113.7");
        let allowlist = Allowlist::new(&config(), resolver.clone());
        let t0 = Instant::now();
        allowlist.allowed_ip_at(t0).await.unwrap();

        resolver.failing.store(true, Ordering::SeqCst);
        let outage = t0 + Duration::from_secs(400);
        for offset in [0, 1, 60, 300] {
            let ip = allowlist
                .allowed_ip_at(outage + Duration::from_secs(offset))
                .await
                .unwrap();
            assert_eq!(ip.to_string(), "203.0.113.7");
        }
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 2);

        allowlist
            .allowed_ip_at(outage + Duration::from_secs(301))
            .await
            .unwrap();
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_never_resolved_fails() {
        let allowlist = Allowlist::new(&config(), ScriptedResolver::failing());
        let err = allowlist.allowed_ip().await.unwrap_err();
        assert!(matches!(err, GatewayError::IdentityResolutionFailed(_)));
        assert!(allowlist.cached_ip().await.is_none());
    }

    #[tokio::test]
    async fn test_check_identity() {
        let allowlist = Allowlist::new(&config(), ScriptedResolver::new("203.0.113.7"));

        allowlist.check(&ClientIdentity::new("203.0.113.7")).await.unwrap();
        let err = allowlist
            .check(&ClientIdentity::new("198.51.100.1"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Unauthorized(_)));
        assert!(allowlist.check(&ClientIdentity::unknown()).await.is_err());
    }

    #[test]
    fn test_matches_ipv4_mapped() {
        let allowed: IpAddr = "203.0.113.7".parse().unwrap();
        assert!(matches(&ClientIdentity::new("::ffff:203.0.113.7"), allowed));
        assert!(!matches(&ClientIdentity::new("not-an-ip"), allowed));
    }

    #[tokio::test]
    async fn test_system_resolver_literal() {
        let ip = SystemResolver.resolve("127.0.0.1").await.unwrap();
        assert_eq!(ip.to_string(), "127.0.0.1");
    }
}
