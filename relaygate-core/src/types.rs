//! Configuration types and provider traits for RelayGate.
//!
//! Configuration is injected through small, composable traits so that the
//! pipeline can be driven by environment variables, files, or a test double.
//! [`ConfigProvider`] aggregates all of them and is implemented automatically.

use std::time::Duration;

use crate::auth::Secrets;

// ============================================================================
// Composable Configuration Traits
// ============================================================================

/// Configuration for the three rate-limit tiers.
pub trait RateLimitingProvider: Send + Sync {
    /// Short window keyed by client identity.
    fn burst_limit_config(&self) -> &RateLimitConfig;

    /// Long window keyed by client identity.
    fn client_limit_config(&self) -> &RateLimitConfig;

    /// Long window shared by all clients.
    fn global_limit_config(&self) -> &RateLimitConfig;

    /// Sweep settings for the in-process counter store.
    fn rate_limit_cleanup_config(&self) -> &RateLimitCleanupConfig;
}

/// Configuration for forwarding and client identification.
pub trait ProxyProvider: Send + Sync {
    /// Returns the proxy configuration.
    fn proxy_config(&self) -> &ProxyConfig;

    /// Header set by the fronting platform with the verified client address.
    fn trusted_ip_header(&self) -> &str;

    /// Peers allowed to supply the trusted header.
    /// When `None` the header is ignored; an entry of `*` trusts every peer.
    fn allowed_proxy_ips(&self) -> Option<&[String]>;

    /// Whether the trusted header is re-injected on the outbound request.
    fn forward_platform_header(&self) -> bool {
        false
    }

    /// Whether `/_debug_ip` and `/_stats` are served.
    fn diagnostics_enabled(&self) -> bool {
        false
    }
}

/// Extra abuse-detection rules on top of the built-in set.
pub trait FilteringProvider: Send + Sync {
    /// Path substrings that mark a request as suspicious.
    fn blocked_patterns(&self) -> &[String];

    /// User-agent substrings (case-insensitive) that mark a request as suspicious.
    fn blocked_user_agents(&self) -> &[String];
}

/// Configuration for caller authentication.
pub trait AuthenticationProvider: Send + Sync {
    /// Credential channel and accepted secrets.
    fn credential_config(&self) -> &CredentialConfig;

    /// DNS-based caller allow-list, if configured.
    fn allowlist_config(&self) -> Option<&AllowlistConfig> {
        None
    }
}

/// Configuration for reputation tracking and the browser challenge.
pub trait ReputationProvider: Send + Sync {
    /// Returns the reputation configuration.
    fn reputation_config(&self) -> &ReputationConfig;

    /// Returns the challenge token configuration.
    fn challenge_config(&self) -> &ChallengeConfig;
}

/// Configuration for the local response cache.
pub trait CacheProvider: Send + Sync {
    /// Returns the response cache configuration.
    fn cache_config(&self) -> &CacheConfig;
}

/// Configuration for connection limits.
pub trait ConnectionProvider: Send + Sync {
    /// Returns the maximum number of concurrent connections.
    fn max_connections(&self) -> usize;
}

// ============================================================================
// ConfigProvider - Aggregated trait for full configuration
// ============================================================================

/// Trait for complete configuration injection.
///
/// This trait combines all specialized configuration traits into one and
/// is implemented for every type that implements them all.
pub trait ConfigProvider:
    RateLimitingProvider
    + ProxyProvider
    + FilteringProvider
    + AuthenticationProvider
    + ReputationProvider
    + CacheProvider
    + ConnectionProvider
{
}

impl<T> ConfigProvider for T where
    T: RateLimitingProvider
        + ProxyProvider
        + FilteringProvider
        + AuthenticationProvider
        + ReputationProvider
        + CacheProvider
        + ConnectionProvider
{
}

// ============================================================================
// Configuration structs
// ============================================================================

/// Limit and window of one rate-limit tier.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use relaygate_core::RateLimitConfig;
///
/// let config = RateLimitConfig {
///     max_requests: 10,
///     window_duration: Duration::from_secs(1),
/// };
///
/// assert!(config.is_valid());
/// ```
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    /// Maximum number of requests admitted within the window
    pub max_requests: u32,
    /// Duration of the fixed window
    pub window_duration: Duration,
}

impl RateLimitConfig {
    /// Returns `true` if the configuration is valid.
    ///
    /// A valid configuration has at least one allowed request and a non-zero window.
    pub fn is_valid(&self) -> bool {
        self.max_requests > 0 && !self.window_duration.is_zero()
    }
}

/// Configuration for automatic cleanup of expired counter entries.
///
/// Prevents memory exhaustion by periodically removing stale entries
/// from the in-process counter store when the entry count exceeds a threshold.
#[derive(Clone, Debug)]
pub struct RateLimitCleanupConfig {
    /// Number of entries before triggering cleanup (0 = disabled)
    pub threshold: usize,
    /// Minimum interval between cleanup operations
    pub interval: Duration,
}

impl RateLimitCleanupConfig {
    /// Returns `true` if automatic cleanup is enabled.
    pub fn is_enabled(&self) -> bool {
        self.threshold > 0
    }
}

/// Configuration for upstream communication.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use relaygate_core::ProxyConfig;
///
/// let config = ProxyConfig {
///     timeout: Duration::from_secs(30),
///     max_body_size: ProxyConfig::mb_to_bytes(10),
///     max_redirects: 10,
///     via_header: Some("relaygate".to_string()),
/// };
///
/// assert!(config.is_valid());
/// assert_eq!(config.max_body_size_mb(), "10");
/// ```
#[derive(Clone, Debug)]
pub struct ProxyConfig {
    /// Timeout for the whole upstream exchange
    pub timeout: Duration,
    /// Maximum request body size in bytes (0 = unlimited)
    pub max_body_size: usize,
    /// Redirects followed automatically (0 = relay redirects to the caller)
    pub max_redirects: usize,
    /// Value of the diagnostic response header, if any
    pub via_header: Option<String>,
}

impl ProxyConfig {
    /// Returns `true` if the configuration is valid.
    pub fn is_valid(&self) -> bool {
        !self.timeout.is_zero()
    }

    /// Returns the maximum body size formatted for display.
    pub fn max_body_size_mb(&self) -> String {
        if self.max_body_size == 0 {
            "unlimited".to_string()
        } else {
            (self.max_body_size / 1024 / 1024).to_string()
        }
    }

    /// Converts megabytes to bytes, keeping 0 as "unlimited".
    /// Values too large to represent saturate at `usize::MAX`.
    pub fn mb_to_bytes(mb: usize) -> usize {
        mb.saturating_mul(1024 * 1024)
    }
}

/// Channel through which the caller presents its credential.
///
/// Exactly one mode is active per deployment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CredentialMode {
    /// First path segment: `/{secret}/{target}`.
    PathSegment,
    /// Named query parameter: `?key={secret}`.
    QueryParam(String),
    /// Named request header, or the password of an `Authorization: Basic` header.
    Header(String),
}

impl CredentialMode {
    /// Parses a mode name (`path`, `query`, `header`) with an optional channel name.
    pub fn parse(mode: &str, name: Option<&str>) -> Option<Self> {
        let name = name.map(str::trim).filter(|n| !n.is_empty());
        match mode.trim().to_ascii_lowercase().as_str() {
            "path" => Some(Self::PathSegment),
            "query" => Some(Self::QueryParam(
                name.unwrap_or(crate::defaults::CREDENTIAL_QUERY_PARAM)
                    .to_string(),
            )),
            "header" => Some(Self::Header(
                name.unwrap_or(crate::defaults::CREDENTIAL_HEADER)
                    .to_ascii_lowercase(),
            )),
            _ => None,
        }
    }

    /// Short name for logs and the startup banner.
    pub fn label(&self) -> &'static str {
        match self {
            Self::PathSegment => "path",
            Self::QueryParam(_) => "query",
            Self::Header(_) => "header",
        }
    }
}

/// Credential channel plus the secrets it accepts.
#[derive(Clone, Debug)]
pub struct CredentialConfig {
    /// Active credential channel
    pub mode: CredentialMode,
    /// Accepted secrets (plain or hashed)
    pub secrets: Secrets,
    /// Realm announced by the interactive prompt
    pub realm: String,
}

/// DNS-based caller allow-list: only the address the hostname resolves to may call.
#[derive(Clone, Debug)]
pub struct AllowlistConfig {
    /// Hostname resolved to the single permitted caller address
    pub hostname: String,
    /// How long a resolution stays fresh
    pub ttl: Duration,
}

/// Reputation thresholds and bounds.
#[derive(Clone, Debug)]
pub struct ReputationConfig {
    /// Violations above which a client is blocked
    pub block_threshold: u32,
    /// Inactivity after which a blocked client is released
    pub cooldown: Duration,
    /// Maximum tracked identities before least-recently-seen eviction
    pub max_tracked: usize,
    /// Violation reasons kept per identity
    pub history_len: usize,
}

impl ReputationConfig {
    /// Violations above which a client is challenged instead of served.
    pub fn challenge_threshold(&self) -> u32 {
        self.block_threshold / 2
    }

    /// Returns `true` if the configuration is valid.
    pub fn is_valid(&self) -> bool {
        self.block_threshold > 0 && self.max_tracked > 0
    }
}

/// Key and time bucket for challenge tokens.
#[derive(Clone)]
pub struct ChallengeConfig {
    /// HMAC key
    pub secret: Vec<u8>,
    /// Token bucket length; tokens stay valid for one to two buckets
    pub token_ttl: Duration,
}

impl ChallengeConfig {
    /// Creates a configuration keyed by a fresh random secret.
    ///
    /// Tokens issued with it do not survive a restart.
    pub fn with_random_secret(token_ttl: Duration) -> Self {
        use rand::RngCore;

        let mut secret = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        Self { secret, token_ttl }
    }
}

impl std::fmt::Debug for ChallengeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChallengeConfig")
            .field("secret", &"[REDACTED]")
            .field("token_ttl", &self.token_ttl)
            .finish()
    }
}

/// Local response cache settings.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Freshness horizon of a cached response (zero disables caching)
    pub ttl: Duration,
    /// Maximum number of cached responses
    pub max_entries: usize,
}

impl CacheConfig {
    /// Returns `true` if responses are cached at all.
    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero() && self.max_entries > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ===========================================
    // RateLimitConfig tests
    // ===========================================

    #[test]
    fn test_rate_limit_config_valid() {
        let config = RateLimitConfig {
            max_requests: 100,
            window_duration: Duration::from_secs(60),
        };
        assert!(config.is_valid());
    }

    #[test]
    fn test_rate_limit_config_invalid_zero_requests() {
        let config = RateLimitConfig {
            max_requests: 0,
            window_duration: Duration::from_secs(60),
        };
        assert!(!config.is_valid());
    }

    #[test]
    fn test_rate_limit_config_invalid_zero_duration() {
        let config = RateLimitConfig {
            max_requests: 100,
            window_duration: Duration::ZERO,
        };
        assert!(!config.is_valid());
    }

    #[test]
    fn test_cleanup_config_enabled() {
        let config = RateLimitCleanupConfig {
            threshold: 10_000,
            interval: Duration::from_secs(60),
        };
        assert!(config.is_enabled());

        let config = RateLimitCleanupConfig {
            threshold: 0,
            interval: Duration::from_secs(60),
        };
        assert!(!config.is_enabled());
    }

    // ===========================================
    // ProxyConfig tests
    // ===========================================

    fn proxy_config(timeout: Duration, max_body_size: usize) -> ProxyConfig {
        ProxyConfig {
            timeout,
            max_body_size,
            max_redirects: 10,
            via_header: None,
        }
    }

    #[test]
    fn test_proxy_config_validity() {
        assert!(proxy_config(Duration::from_secs(30), 0).is_valid());
        assert!(!proxy_config(Duration::ZERO, 1024).is_valid());
    }

    #[test]
    fn test_proxy_config_max_body_size_mb() {
        assert_eq!(proxy_config(Duration::from_secs(1), 0).max_body_size_mb(), "unlimited");
        assert_eq!(
            proxy_config(Duration::from_secs(1), 10 * 1024 * 1024).max_body_size_mb(),
            "10"
        );
    }

    #[test]
    fn test_proxy_config_mb_to_bytes() {
        assert_eq!(ProxyConfig::mb_to_bytes(0), 0);
        assert_eq!(ProxyConfig::mb_to_bytes(1), 1024 * 1024);
    }

    #[test]
    fn test_proxy_config_mb_to_bytes_saturates() {
        assert_eq!(ProxyConfig::mb_to_bytes(usize::MAX), usize::MAX);
        assert_eq!(ProxyConfig::mb_to_bytes(usize::MAX / 1024), usize::MAX);
    }

    // ===========================================
    // CredentialMode tests
    // ===========================================

    #[test]
    fn test_credential_mode_parse() {
        assert_eq!(
            CredentialMode::parse("path", None),
            Some(CredentialMode::PathSegment)
        );
        assert_eq!(
            CredentialMode::parse("query", None),
            Some(CredentialMode::QueryParam("key".to_string()))
        );
        assert_eq!(
            CredentialMode::parse("HEADER", Some("X-Api-Key")),
            Some(CredentialMode::Header("x-api-key".to_string()))
        );
        assert_eq!(
            CredentialMode::parse("header", Some("  ")),
            Some(CredentialMode::Header("x-proxy-key".to_string()))
        );
        assert_eq!(CredentialMode::parse("cookie", None), None);
    }

    // ===========================================
    // ReputationConfig / ChallengeConfig / CacheConfig tests
    // ===========================================

    #[test]
    fn test_challenge_threshold_is_half_of_block_threshold() {
        let config = ReputationConfig {
            block_threshold: 200,
            cooldown: Duration::from_secs(3600),
            max_tracked: 1000,
            history_len: 20,
        };
        assert_eq!(config.challenge_threshold(), 100);
        assert!(config.is_valid());
    }

    #[test]
    fn test_random_challenge_secrets_differ() {
        let a = ChallengeConfig::with_random_secret(Duration::from_secs(300));
        let b = ChallengeConfig::with_random_secret(Duration::from_secs(300));
        assert_eq!(a.secret.len(), 32);
        assert_ne!(a.secret, b.secret);
        assert!(!format!("{a:?}").contains(&format!("{:?}", a.secret)));
    }

    #[test]
    fn test_cache_config_enabled() {
        let enabled = CacheConfig {
            ttl: Duration::from_secs(60),
            max_entries: 10,
        };
        let disabled = CacheConfig {
            ttl: Duration::ZERO,
            max_entries: 10,
        };
        assert!(enabled.is_enabled());
        assert!(!disabled.is_enabled());
    }
}
