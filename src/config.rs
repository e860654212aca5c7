//! Configuration management for RelayGate.
//!
//! This module handles loading and caching configuration from environment variables.
//! All configurations are computed once at first access and cached for the lifetime
//! of the application using `once_cell::sync::Lazy`.
//!
//! # Caching
//!
//! Configuration values are read from environment variables only once, at startup.
//! This provides:
//! - Consistent configuration throughout the application lifetime
//! - A single random challenge secret per process when none is configured
//! - Thread-safe access without locking
//!
//! Every `compute_*` function takes the variable lookup as a parameter, so
//! parsing is tested without touching the process environment.
//!
//! # Example
//!
//! ```
//! use relaygate::config;
//!
//! let burst = config::get_burst_limit_config();
//! println!("Burst: {} per {:?}", burst.max_requests, burst.window_duration);
//!
//! let proxy_config = config::get_proxy_config();
//! println!("Timeout: {:?}", proxy_config.timeout);
//! ```

use std::env::{self, VarError};
use std::str::FromStr;
use std::time::Duration;

use once_cell::sync::Lazy;
use tracing::warn;

use crate::env_vars;
use relaygate_core::auth::Secrets;
use relaygate_core::defaults;
use relaygate_core::identity;
use relaygate_core::{
    AllowlistConfig, AuthenticationProvider, CacheConfig, CacheProvider, ChallengeConfig,
    ConnectionProvider, CredentialConfig, CredentialMode, FilteringProvider, ProxyConfig,
    ProxyProvider, RateLimitCleanupConfig, RateLimitConfig, RateLimitingProvider,
    ReputationConfig, ReputationProvider,
};

// ============================================================================
// Cached Configuration (computed once at first access)
// ============================================================================

fn process_env(key: &str) -> Result<String, VarError> {
    env::var(key)
}

static BURST_LIMIT_CONFIG: Lazy<RateLimitConfig> = Lazy::new(|| {
    compute_limit_config(
        &process_env,
        env_vars::BURST_LIMIT_REQUESTS,
        env_vars::BURST_LIMIT_WINDOW_SECS,
        defaults::BURST_LIMIT_REQUESTS,
        defaults::BURST_LIMIT_WINDOW_SECS,
    )
});
static CLIENT_LIMIT_CONFIG: Lazy<RateLimitConfig> = Lazy::new(|| {
    compute_limit_config(
        &process_env,
        env_vars::RATE_LIMIT_REQUESTS,
        env_vars::RATE_LIMIT_WINDOW_SECS,
        defaults::RATE_LIMIT_REQUESTS,
        defaults::RATE_LIMIT_WINDOW_SECS,
    )
});
static GLOBAL_LIMIT_CONFIG: Lazy<RateLimitConfig> = Lazy::new(|| {
    compute_limit_config(
        &process_env,
        env_vars::GLOBAL_LIMIT_REQUESTS,
        env_vars::GLOBAL_LIMIT_WINDOW_SECS,
        defaults::GLOBAL_LIMIT_REQUESTS,
        defaults::GLOBAL_LIMIT_WINDOW_SECS,
    )
});
static RATE_LIMIT_CLEANUP_CONFIG: Lazy<RateLimitCleanupConfig> =
    Lazy::new(|| compute_rate_limit_cleanup_config(&process_env));
static PROXY_CONFIG: Lazy<ProxyConfig> = Lazy::new(|| compute_proxy_config(&process_env));
static TRUSTED_IP_HEADER: Lazy<String> = Lazy::new(|| compute_trusted_ip_header(&process_env));
static ALLOWED_PROXY_IPS: Lazy<Option<Vec<String>>> =
    Lazy::new(|| compute_allowed_proxy_ips(&process_env));
static FORWARD_PLATFORM_HEADER: Lazy<bool> =
    Lazy::new(|| parse_bool_env(&process_env, env_vars::FORWARD_PLATFORM_HEADER, false));
static DIAGNOSTICS_ENABLED: Lazy<bool> =
    Lazy::new(|| parse_bool_env(&process_env, env_vars::ENABLE_DIAGNOSTICS, false));
static BLOCKED_PATTERNS: Lazy<Vec<String>> =
    Lazy::new(|| compute_list(&process_env, env_vars::BLOCKED_PATTERNS));
static BLOCKED_USER_AGENTS: Lazy<Vec<String>> =
    Lazy::new(|| compute_list(&process_env, env_vars::BLOCKED_USER_AGENTS));
static CREDENTIAL_CONFIG: Lazy<CredentialConfig> =
    Lazy::new(|| compute_credential_config(&process_env));
static ALLOWLIST_CONFIG: Lazy<Option<AllowlistConfig>> =
    Lazy::new(|| compute_allowlist_config(&process_env));
static REPUTATION_CONFIG: Lazy<ReputationConfig> =
    Lazy::new(|| compute_reputation_config(&process_env));
static CHALLENGE_CONFIG: Lazy<ChallengeConfig> =
    Lazy::new(|| compute_challenge_config(&process_env));
static CACHE_CONFIG: Lazy<CacheConfig> = Lazy::new(|| compute_cache_config(&process_env));
static MAX_CONNECTIONS: Lazy<usize> = Lazy::new(|| {
    parse_env_var_or_default(
        &process_env,
        env_vars::MAX_CONNECTIONS,
        defaults::MAX_CONNECTIONS,
    )
});

// ============================================================================
// Internal Helpers
// ============================================================================

/// Parses an environment variable with fallback to a default value.
///
/// Logs a warning if the value exists but cannot be parsed.
fn parse_env_var_or_default<T, F>(env: &F, var_name: &str, default: T) -> T
where
    T: FromStr + Copy,
    F: Fn(&str) -> Result<String, VarError>,
{
    match env(var_name) {
        Ok(value) => match value.trim().parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(var = var_name, value = %value, "Invalid env var value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

/// Parses a boolean flag (`true/false`, `1/0`, `yes/no`, `on/off`).
fn parse_bool_env<F>(env: &F, var_name: &str, default: bool) -> bool
where
    F: Fn(&str) -> Result<String, VarError>,
{
    let Ok(value) = env(var_name) else {
        return default;
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => {
            warn!(var = var_name, value = %value, "Invalid boolean env var, using default");
            default
        }
    }
}

/// Trimmed, non-empty value of a variable.
fn env_string<F>(env: &F, var_name: &str) -> Option<String>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    env(var_name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parses a comma-separated string into a Vec of trimmed strings.
///
/// Filters out empty entries after trimming.
fn parse_comma_separated(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn compute_list<F>(env: &F, var_name: &str) -> Vec<String>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    env(var_name)
        .map(|s| parse_comma_separated(&s))
        .unwrap_or_default()
}

// ============================================================================
// Computation
// ============================================================================

/// Computes one rate-limit tier. Invalid values fall back to the tier defaults.
fn compute_limit_config<F>(
    env: &F,
    requests_var: &str,
    window_var: &str,
    default_requests: u32,
    default_window_secs: u64,
) -> RateLimitConfig
where
    F: Fn(&str) -> Result<String, VarError>,
{
    let config = RateLimitConfig {
        max_requests: parse_env_var_or_default(env, requests_var, default_requests),
        window_duration: Duration::from_secs(parse_env_var_or_default(
            env,
            window_var,
            default_window_secs,
        )),
    };

    if !config.is_valid() {
        warn!(var = requests_var, "Invalid rate limit configuration, using defaults");
        return RateLimitConfig {
            max_requests: default_requests,
            window_duration: Duration::from_secs(default_window_secs),
        };
    }

    config
}

fn compute_rate_limit_cleanup_config<F>(env: &F) -> RateLimitCleanupConfig
where
    F: Fn(&str) -> Result<String, VarError>,
{
    let threshold = parse_env_var_or_default(
        env,
        env_vars::RATE_LIMIT_CLEANUP_THRESHOLD,
        defaults::RATE_LIMIT_CLEANUP_THRESHOLD,
    );
    let interval_secs = parse_env_var_or_default(
        env,
        env_vars::RATE_LIMIT_CLEANUP_INTERVAL_SECS,
        defaults::RATE_LIMIT_CLEANUP_INTERVAL_SECS,
    );

    RateLimitCleanupConfig {
        threshold,
        interval: Duration::from_secs(interval_secs),
    }
}

fn compute_proxy_config<F>(env: &F) -> ProxyConfig
where
    F: Fn(&str) -> Result<String, VarError>,
{
    let timeout_secs =
        parse_env_var_or_default(env, env_vars::PROXY_TIMEOUT_SECS, defaults::PROXY_TIMEOUT_SECS);
    let max_body_mb =
        parse_env_var_or_default(env, env_vars::MAX_BODY_SIZE_MB, defaults::MAX_BODY_SIZE_MB);
    let max_redirects =
        parse_env_var_or_default(env, env_vars::MAX_REDIRECTS, defaults::MAX_REDIRECTS);

    // Unset keeps the default; set-but-empty disables the header.
    let via_header = match env(env_vars::VIA_HEADER) {
        Ok(value) if value.trim().is_empty() => None,
        Ok(value) => Some(value.trim().to_string()),
        Err(_) => Some(defaults::VIA_HEADER.to_string()),
    };

    let config = ProxyConfig {
        timeout: Duration::from_secs(timeout_secs),
        max_body_size: ProxyConfig::mb_to_bytes(max_body_mb),
        max_redirects,
        via_header,
    };

    if !config.is_valid() {
        warn!("Invalid proxy configuration, using default timeout");
        return ProxyConfig {
            timeout: defaults::PROXY_TIMEOUT,
            ..config
        };
    }

    config
}

fn compute_trusted_ip_header<F>(env: &F) -> String
where
    F: Fn(&str) -> Result<String, VarError>,
{
    env_string(env, env_vars::TRUSTED_IP_HEADER)
        .unwrap_or_else(|| defaults::TRUSTED_IP_HEADER.to_string())
        .to_ascii_lowercase()
}

/// `Some` only when the variable lists at least one address or `*`.
///
/// Without it the platform header is ignored and the peer address is the
/// identity.
fn compute_allowed_proxy_ips<F>(env: &F) -> Option<Vec<String>>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    let ips = env_string(env, env_vars::TRUSTED_PROXY_IPS)
        .map(|ips| parse_comma_separated(&ips))
        .filter(|ips| !ips.is_empty())?;
    if identity::trusts_any_peer(&ips) {
        warn!(
            var = env_vars::TRUSTED_PROXY_IPS,
            "Platform header trusted from every peer, the listener must only be reachable through the platform"
        );
    }
    Some(ips)
}

fn compute_credential_config<F>(env: &F) -> CredentialConfig
where
    F: Fn(&str) -> Result<String, VarError>,
{
    let name = env_string(env, env_vars::CREDENTIAL_NAME);
    let mode = match env_string(env, env_vars::CREDENTIAL_MODE) {
        None => CredentialMode::PathSegment,
        Some(raw) => CredentialMode::parse(&raw, name.as_deref()).unwrap_or_else(|| {
            warn!(var = env_vars::CREDENTIAL_MODE, value = %raw, "Unknown credential mode, using path");
            CredentialMode::PathSegment
        }),
    };

    let secrets = env(env_vars::PROXY_SECRETS)
        .map(|s| Secrets::parse(&s))
        .unwrap_or_default();
    if secrets.is_empty() {
        warn!(var = env_vars::PROXY_SECRETS, "No credentials configured, every request will be rejected");
    }

    CredentialConfig {
        mode,
        secrets,
        realm: env_string(env, env_vars::AUTH_REALM)
            .unwrap_or_else(|| defaults::AUTH_REALM.to_string()),
    }
}

fn compute_allowlist_config<F>(env: &F) -> Option<AllowlistConfig>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    let hostname = env_string(env, env_vars::ALLOWLIST_HOSTNAME)?;
    let ttl_secs =
        parse_env_var_or_default(env, env_vars::ALLOWLIST_TTL_SECS, defaults::ALLOWLIST_TTL_SECS);
    Some(AllowlistConfig {
        hostname,
        ttl: Duration::from_secs(ttl_secs),
    })
}

fn compute_reputation_config<F>(env: &F) -> ReputationConfig
where
    F: Fn(&str) -> Result<String, VarError>,
{
    let default = ReputationConfig {
        block_threshold: defaults::REPUTATION_BLOCK_THRESHOLD,
        cooldown: Duration::from_secs(defaults::REPUTATION_COOLDOWN_SECS),
        max_tracked: defaults::REPUTATION_MAX_TRACKED,
        history_len: defaults::REPUTATION_HISTORY_LEN,
    };

    let config = ReputationConfig {
        block_threshold: parse_env_var_or_default(
            env,
            env_vars::REPUTATION_BLOCK_THRESHOLD,
            default.block_threshold,
        ),
        cooldown: Duration::from_secs(parse_env_var_or_default(
            env,
            env_vars::REPUTATION_COOLDOWN_SECS,
            defaults::REPUTATION_COOLDOWN_SECS,
        )),
        max_tracked: parse_env_var_or_default(
            env,
            env_vars::REPUTATION_MAX_TRACKED,
            default.max_tracked,
        ),
        history_len: default.history_len,
    };

    if !config.is_valid() {
        warn!("Invalid reputation configuration, using defaults");
        return default;
    }

    config
}

fn compute_challenge_config<F>(env: &F) -> ChallengeConfig
where
    F: Fn(&str) -> Result<String, VarError>,
{
    let ttl = Duration::from_secs(
        parse_env_var_or_default(env, env_vars::CHALLENGE_TTL_SECS, defaults::CHALLENGE_TTL_SECS)
            .max(1),
    );
    match env_string(env, env_vars::CHALLENGE_SECRET) {
        Some(secret) => ChallengeConfig {
            secret: secret.into_bytes(),
            token_ttl: ttl,
        },
        None => ChallengeConfig::with_random_secret(ttl),
    }
}

fn compute_cache_config<F>(env: &F) -> CacheConfig
where
    F: Fn(&str) -> Result<String, VarError>,
{
    CacheConfig {
        ttl: Duration::from_secs(parse_env_var_or_default(
            env,
            env_vars::RESPONSE_CACHE_TTL_SECS,
            defaults::RESPONSE_CACHE_TTL_SECS,
        )),
        max_entries: parse_env_var_or_default(
            env,
            env_vars::RESPONSE_CACHE_MAX_ENTRIES,
            defaults::RESPONSE_CACHE_MAX_ENTRIES,
        ),
    }
}

// ============================================================================
// Public Configuration Getters
// ============================================================================

/// Returns the cached burst tier configuration.
///
/// - `BURST_LIMIT_REQUESTS`: Max requests per window (default: 10)
/// - `BURST_LIMIT_WINDOW_SECS`: Window duration in seconds (default: 1)
pub fn get_burst_limit_config() -> &'static RateLimitConfig {
    &BURST_LIMIT_CONFIG
}

/// Returns the cached per-client tier configuration.
///
/// - `RATE_LIMIT_REQUESTS`: Max requests per window (default: 60)
/// - `RATE_LIMIT_WINDOW_SECS`: Window duration in seconds (default: 60)
pub fn get_client_limit_config() -> &'static RateLimitConfig {
    &CLIENT_LIMIT_CONFIG
}

/// Returns the cached global tier configuration.
///
/// - `GLOBAL_LIMIT_REQUESTS`: Max requests per window, all clients (default: 1000)
/// - `GLOBAL_LIMIT_WINDOW_SECS`: Window duration in seconds (default: 60)
pub fn get_global_limit_config() -> &'static RateLimitConfig {
    &GLOBAL_LIMIT_CONFIG
}

/// Returns the cached counter store cleanup configuration.
///
/// # Example
///
/// ```
/// use relaygate::config::get_rate_limit_cleanup_config;
///
/// let config = get_rate_limit_cleanup_config();
/// if config.is_enabled() {
///     println!("Cleanup triggers at {} entries", config.threshold);
/// }
/// ```
pub fn get_rate_limit_cleanup_config() -> &'static RateLimitCleanupConfig {
    &RATE_LIMIT_CLEANUP_CONFIG
}

/// Returns the cached proxy configuration.
///
/// - `PROXY_TIMEOUT_SECS`: Upstream timeout (default: 30)
/// - `MAX_BODY_SIZE_MB`: Maximum request body size (default: 10, 0 = unlimited)
/// - `MAX_REDIRECTS`: Redirects followed (default: 10, 0 = relay them)
/// - `VIA_HEADER`: `x-proxied-by` value (default: `relaygate`, empty disables)
pub fn get_proxy_config() -> &'static ProxyConfig {
    &PROXY_CONFIG
}

pub fn get_trusted_ip_header() -> &'static str {
    &TRUSTED_IP_HEADER
}

/// Returns the trusted proxy list, if configured.
///
/// When `Some`, RelayGate operates in strict mode: the trusted header is
/// only honoured on connections from these peers.
pub fn get_allowed_proxy_ips() -> Option<&'static Vec<String>> {
    ALLOWED_PROXY_IPS.as_ref()
}

pub fn get_forward_platform_header() -> bool {
    *FORWARD_PLATFORM_HEADER
}

pub fn get_diagnostics_enabled() -> bool {
    *DIAGNOSTICS_ENABLED
}

pub fn get_blocked_patterns() -> &'static Vec<String> {
    &BLOCKED_PATTERNS
}

pub fn get_blocked_user_agents() -> &'static Vec<String> {
    &BLOCKED_USER_AGENTS
}

/// Returns the cached credential configuration.
pub fn get_credential_config() -> &'static CredentialConfig {
    &CREDENTIAL_CONFIG
}

pub fn get_allowlist_config() -> Option<&'static AllowlistConfig> {
    ALLOWLIST_CONFIG.as_ref()
}

pub fn get_reputation_config() -> &'static ReputationConfig {
    &REPUTATION_CONFIG
}

/// Returns the challenge configuration; the secret is random per process
/// unless `CHALLENGE_SECRET` is set.
pub fn get_challenge_config() -> &'static ChallengeConfig {
    &CHALLENGE_CONFIG
}

pub fn get_cache_config() -> &'static CacheConfig {
    &CACHE_CONFIG
}

/// Returns the cached maximum number of concurrent connections (0 = unlimited).
pub fn get_max_connections() -> usize {
    *MAX_CONNECTIONS
}

// ============================================================================
// EnvVarConfig - ConfigProvider implementation using environment variables
// ============================================================================

/// Configuration provider that reads from environment variables.
///
/// This is the default configuration provider for the RelayGate CLI.
/// All values come from the global lazy statics.
///
/// # Example
///
/// ```
/// use relaygate::config::EnvVarConfig;
/// use relaygate::RateLimitingProvider;
///
/// let config = EnvVarConfig::new();
/// println!("Burst limit: {}", config.burst_limit_config().max_requests);
/// ```
#[derive(Clone, Debug)]
pub struct EnvVarConfig {
    _private: (),
}

impl EnvVarConfig {
    /// Creates a new configuration provider from environment variables.
    pub fn new() -> Self {
        Self { _private: () }
    }
}

impl Default for EnvVarConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitingProvider for EnvVarConfig {
    fn burst_limit_config(&self) -> &RateLimitConfig {
        get_burst_limit_config()
    }

    fn client_limit_config(&self) -> &RateLimitConfig {
        get_client_limit_config()
    }

    fn global_limit_config(&self) -> &RateLimitConfig {
        get_global_limit_config()
    }

    fn rate_limit_cleanup_config(&self) -> &RateLimitCleanupConfig {
        get_rate_limit_cleanup_config()
    }
}

impl ProxyProvider for EnvVarConfig {
    fn proxy_config(&self) -> &ProxyConfig {
        get_proxy_config()
    }

    fn trusted_ip_header(&self) -> &str {
        get_trusted_ip_header()
    }

    fn allowed_proxy_ips(&self) -> Option<&[String]> {
        get_allowed_proxy_ips().map(|v| v.as_slice())
    }

    fn forward_platform_header(&self) -> bool {
        get_forward_platform_header()
    }

    fn diagnostics_enabled(&self) -> bool {
        get_diagnostics_enabled()
    }
}

impl FilteringProvider for EnvVarConfig {
    fn blocked_patterns(&self) -> &[String] {
        get_blocked_patterns()
    }

    fn blocked_user_agents(&self) -> &[String] {
        get_blocked_user_agents()
    }
}

impl AuthenticationProvider for EnvVarConfig {
    fn credential_config(&self) -> &CredentialConfig {
        get_credential_config()
    }

    fn allowlist_config(&self) -> Option<&AllowlistConfig> {
        get_allowlist_config()
    }
}

impl ReputationProvider for EnvVarConfig {
    fn reputation_config(&self) -> &ReputationConfig {
        get_reputation_config()
    }

    fn challenge_config(&self) -> &ChallengeConfig {
        get_challenge_config()
    }
}

impl CacheProvider for EnvVarConfig {
    fn cache_config(&self) -> &CacheConfig {
        get_cache_config()
    }
}

impl ConnectionProvider for EnvVarConfig {
    fn max_connections(&self) -> usize {
        get_max_connections()
    }
}
