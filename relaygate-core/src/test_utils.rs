//! Shared test configuration.
//!
//! [`TestConfig`] implements every provider trait with the production
//! defaults, plus `with_*` builders to override individual settings.
//! [`RecordingUpstream`] and [`StaticResolver`] stand in for the network.

use std::net::IpAddr;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use hyper::header::HeaderValue;
use hyper::{HeaderMap, StatusCode};

use crate::allowlist::Resolver;
use crate::auth::Secrets;
use crate::defaults;
use crate::error::{GatewayError, Result};
use crate::forwarder::{UpstreamClient, UpstreamResponse};
use crate::rewrite::TargetRequest;
use crate::types::{
    AllowlistConfig, AuthenticationProvider, CacheConfig, CacheProvider, ChallengeConfig,
    ConnectionProvider, CredentialConfig, CredentialMode, FilteringProvider, ProxyConfig,
    ProxyProvider, RateLimitCleanupConfig, RateLimitConfig, RateLimitingProvider,
    ReputationConfig, ReputationProvider,
};

/// Secret accepted by [`TestConfig::new`].
pub const TEST_SECRET: &str = "test-key";

/// Test configuration for unit and integration tests.
#[derive(Clone, Debug)]
pub struct TestConfig {
    burst: RateLimitConfig,
    client: RateLimitConfig,
    global: RateLimitConfig,
    cleanup: RateLimitCleanupConfig,
    proxy: ProxyConfig,
    trusted_ip_header: String,
    allowed_proxy_ips: Option<Vec<String>>,
    forward_platform_header: bool,
    diagnostics: bool,
    blocked_patterns: Vec<String>,
    blocked_user_agents: Vec<String>,
    credential: CredentialConfig,
    allowlist: Option<AllowlistConfig>,
    reputation: ReputationConfig,
    challenge: ChallengeConfig,
    cache: CacheConfig,
    max_connections: usize,
}

fn limit(max_requests: u32, window_secs: u64) -> RateLimitConfig {
    RateLimitConfig {
        max_requests,
        window_duration: Duration::from_secs(window_secs),
    }
}

impl TestConfig {
    /// Production defaults, path-segment credential [`TEST_SECRET`], cache disabled.
    pub fn new() -> Self {
        Self {
            burst: limit(defaults::BURST_LIMIT_REQUESTS, defaults::BURST_LIMIT_WINDOW_SECS),
            client: limit(defaults::RATE_LIMIT_REQUESTS, defaults::RATE_LIMIT_WINDOW_SECS),
            global: limit(
                defaults::GLOBAL_LIMIT_REQUESTS,
                defaults::GLOBAL_LIMIT_WINDOW_SECS,
            ),
            cleanup: RateLimitCleanupConfig {
                threshold: 0,
                interval: defaults::RATE_LIMIT_CLEANUP_INTERVAL,
            },
            proxy: ProxyConfig {
                timeout: defaults::PROXY_TIMEOUT,
                max_body_size: defaults::MAX_BODY_SIZE,
                max_redirects: defaults::MAX_REDIRECTS,
                via_header: Some(defaults::VIA_HEADER.to_string()),
            },
            trusted_ip_header: defaults::TRUSTED_IP_HEADER.to_string(),
            allowed_proxy_ips: None,
            forward_platform_header: false,
            diagnostics: false,
            blocked_patterns: vec![],
            blocked_user_agents: vec![],
            credential: CredentialConfig {
                mode: CredentialMode::PathSegment,
                secrets: Secrets::parse(TEST_SECRET),
                realm: defaults::AUTH_REALM.to_string(),
            },
            allowlist: None,
            reputation: ReputationConfig {
                block_threshold: defaults::REPUTATION_BLOCK_THRESHOLD,
                cooldown: Duration::from_secs(defaults::REPUTATION_COOLDOWN_SECS),
                max_tracked: defaults::REPUTATION_MAX_TRACKED,
                history_len: defaults::REPUTATION_HISTORY_LEN,
            },
            challenge: ChallengeConfig {
                secret: b"test-challenge-secret".to_vec(),
                token_ttl: Duration::from_secs(defaults::CHALLENGE_TTL_SECS),
            },
            cache: CacheConfig {
                ttl: Duration::ZERO,
                max_entries: defaults::RESPONSE_CACHE_MAX_ENTRIES,
            },
            max_connections: defaults::MAX_CONNECTIONS,
        }
    }

    pub fn with_burst_limit(mut self, max_requests: u32, window_secs: u64) -> Self {
        self.burst = limit(max_requests, window_secs);
        self
    }

    pub fn with_client_limit(mut self, max_requests: u32, window_secs: u64) -> Self {
        self.client = limit(max_requests, window_secs);
        self
    }

    pub fn with_global_limit(mut self, max_requests: u32, window_secs: u64) -> Self {
        self.global = limit(max_requests, window_secs);
        self
    }

    pub fn with_cleanup_threshold(mut self, threshold: usize) -> Self {
        self.cleanup.threshold = threshold;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.proxy.timeout = timeout;
        self
    }

    pub fn with_max_body_size(mut self, bytes: usize) -> Self {
        self.proxy.max_body_size = bytes;
        self
    }

    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.proxy.max_redirects = max_redirects;
        self
    }

    pub fn with_via_header(mut self, value: Option<&str>) -> Self {
        self.proxy.via_header = value.map(String::from);
        self
    }

    pub fn with_trusted_ip_header(mut self, name: &str) -> Self {
        self.trusted_ip_header = name.to_string();
        self
    }

    pub fn with_allowed_proxy_ips(mut self, ips: Vec<&str>) -> Self {
        self.allowed_proxy_ips = Some(ips.into_iter().map(String::from).collect());
        self
    }

    pub fn with_forward_platform_header(mut self, enabled: bool) -> Self {
        self.forward_platform_header = enabled;
        self
    }

    pub fn with_diagnostics(mut self, enabled: bool) -> Self {
        self.diagnostics = enabled;
        self
    }

    pub fn with_blocked_patterns(mut self, patterns: Vec<&str>) -> Self {
        self.blocked_patterns = patterns.into_iter().map(String::from).collect();
        self
    }

    pub fn with_blocked_user_agents(mut self, agents: Vec<&str>) -> Self {
        self.blocked_user_agents = agents.into_iter().map(String::from).collect();
        self
    }

    pub fn with_credential_mode(mut self, mode: CredentialMode) -> Self {
        self.credential.mode = mode;
        self
    }

    pub fn with_secrets(mut self, secrets: &str) -> Self {
        self.credential.secrets = Secrets::parse(secrets);
        self
    }

    pub fn with_allowlist(mut self, hostname: &str, ttl: Duration) -> Self {
        self.allowlist = Some(AllowlistConfig {
            hostname: hostname.to_string(),
            ttl,
        });
        self
    }

    pub fn with_block_threshold(mut self, threshold: u32) -> Self {
        self.reputation.block_threshold = threshold;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.reputation.cooldown = cooldown;
        self
    }

    pub fn with_max_tracked(mut self, max_tracked: usize) -> Self {
        self.reputation.max_tracked = max_tracked;
        self
    }

    pub fn with_history_len(mut self, history_len: usize) -> Self {
        self.reputation.history_len = history_len;
        self
    }

    pub fn with_challenge_secret(mut self, secret: &[u8]) -> Self {
        self.challenge.secret = secret.to_vec();
        self
    }

    pub fn with_cache(mut self, ttl: Duration, max_entries: usize) -> Self {
        self.cache = CacheConfig { ttl, max_entries };
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }
}

impl Default for TestConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitingProvider for TestConfig {
    fn burst_limit_config(&self) -> &RateLimitConfig {
        &self.burst
    }

    fn client_limit_config(&self) -> &RateLimitConfig {
        &self.client
    }

    fn global_limit_config(&self) -> &RateLimitConfig {
        &self.global
    }

    fn rate_limit_cleanup_config(&self) -> &RateLimitCleanupConfig {
        &self.cleanup
    }
}

impl ProxyProvider for TestConfig {
    fn proxy_config(&self) -> &ProxyConfig {
        &self.proxy
    }

    fn trusted_ip_header(&self) -> &str {
        &self.trusted_ip_header
    }

    fn allowed_proxy_ips(&self) -> Option<&[String]> {
        self.allowed_proxy_ips.as_deref()
    }

    fn forward_platform_header(&self) -> bool {
        self.forward_platform_header
    }

    fn diagnostics_enabled(&self) -> bool {
        self.diagnostics
    }
}

impl FilteringProvider for TestConfig {
    fn blocked_patterns(&self) -> &[String] {
        &self.blocked_patterns
    }

    fn blocked_user_agents(&self) -> &[String] {
        &self.blocked_user_agents
    }
}

impl AuthenticationProvider for TestConfig {
    fn credential_config(&self) -> &CredentialConfig {
        &self.credential
    }

    fn allowlist_config(&self) -> Option<&AllowlistConfig> {
        self.allowlist.as_ref()
    }
}

impl ReputationProvider for TestConfig {
    fn reputation_config(&self) -> &ReputationConfig {
        &self.reputation
    }

    fn challenge_config(&self) -> &ChallengeConfig {
        &self.challenge
    }
}

impl CacheProvider for TestConfig {
    fn cache_config(&self) -> &CacheConfig {
        &self.cache
    }
}

impl ConnectionProvider for TestConfig {
    fn max_connections(&self) -> usize {
        self.max_connections
    }
}

// ============================================================================
// Test doubles
// ============================================================================

#[derive(Clone, Copy, Debug)]
enum Failure {
    Unreachable,
    Timeout,
}

/// In-process upstream that answers with a canned response and records
/// every request it receives.
#[derive(Debug)]
pub struct RecordingUpstream {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    failure: Option<Failure>,
    requests: Mutex<Vec<TargetRequest>>,
}

impl RecordingUpstream {
    /// Answers `200 OK` with `body`.
    pub fn ok(body: &'static str) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::from_static(body.as_bytes()),
            failure: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Fails every request with [`GatewayError::UpstreamUnreachable`].
    pub fn unreachable() -> Self {
        Self {
            failure: Some(Failure::Unreachable),
            ..Self::ok("")
        }
    }

    /// Fails every request with [`GatewayError::UpstreamTimeout`].
    pub fn timing_out() -> Self {
        Self {
            failure: Some(Failure::Timeout),
            ..Self::ok("")
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn with_header(mut self, name: &'static str, value: &'static str) -> Self {
        self.headers.append(name, HeaderValue::from_static(value));
        self
    }

    /// Number of requests received.
    pub fn calls(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }

    /// Most recent request received.
    pub fn last_request(&self) -> Option<TargetRequest> {
        self.requests.lock().ok().and_then(|r| r.last().cloned())
    }
}

#[async_trait]
impl UpstreamClient for RecordingUpstream {
    async fn send(&self, request: TargetRequest) -> Result<UpstreamResponse> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        match self.failure {
            Some(Failure::Unreachable) => Err(GatewayError::UpstreamUnreachable(
                "connection refused".into(),
            )),
            Some(Failure::Timeout) => Err(GatewayError::UpstreamTimeout("no response".into())),
            None => Ok(UpstreamResponse {
                status: self.status,
                headers: self.headers.clone(),
                body: self.body.clone(),
            }),
        }
    }
}

/// Resolver with a fixed answer; `None` fails every lookup.
#[derive(Clone, Copy, Debug)]
pub struct StaticResolver(pub Option<IpAddr>);

#[async_trait]
impl Resolver for StaticResolver {
    async fn resolve(&self, hostname: &str) -> std::result::Result<IpAddr, String> {
        self.0.ok_or_else(|| format!("{hostname}: NXDOMAIN"))
    }
}
