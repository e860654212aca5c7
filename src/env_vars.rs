//! Environment variable names used throughout RelayGate configuration

/// Credential gate
pub const PROXY_SECRETS: &str = "PROXY_SECRETS";
pub const CREDENTIAL_MODE: &str = "CREDENTIAL_MODE";
pub const CREDENTIAL_NAME: &str = "CREDENTIAL_NAME";
pub const AUTH_REALM: &str = "AUTH_REALM";

/// Client identity
pub const TRUSTED_IP_HEADER: &str = "TRUSTED_IP_HEADER";
pub const TRUSTED_PROXY_IPS: &str = "TRUSTED_PROXY_IPS";
pub const FORWARD_PLATFORM_HEADER: &str = "FORWARD_PLATFORM_HEADER";

/// Rate limiting configuration
pub const BURST_LIMIT_REQUESTS: &str = "BURST_LIMIT_REQUESTS";
pub const BURST_LIMIT_WINDOW_SECS: &str = "BURST_LIMIT_WINDOW_SECS";
pub const RATE_LIMIT_REQUESTS: &str = "RATE_LIMIT_REQUESTS";
pub const RATE_LIMIT_WINDOW_SECS: &str = "RATE_LIMIT_WINDOW_SECS";
pub const GLOBAL_LIMIT_REQUESTS: &str = "GLOBAL_LIMIT_REQUESTS";
pub const GLOBAL_LIMIT_WINDOW_SECS: &str = "GLOBAL_LIMIT_WINDOW_SECS";
pub const RATE_LIMIT_CLEANUP_THRESHOLD: &str = "RATE_LIMIT_CLEANUP_THRESHOLD";
pub const RATE_LIMIT_CLEANUP_INTERVAL_SECS: &str = "RATE_LIMIT_CLEANUP_INTERVAL_SECS";

/// Reputation and challenge
pub const REPUTATION_BLOCK_THRESHOLD: &str = "REPUTATION_BLOCK_THRESHOLD";
pub const REPUTATION_COOLDOWN_SECS: &str = "REPUTATION_COOLDOWN_SECS";
pub const REPUTATION_MAX_TRACKED: &str = "REPUTATION_MAX_TRACKED";
pub const CHALLENGE_SECRET: &str = "CHALLENGE_SECRET";
pub const CHALLENGE_TTL_SECS: &str = "CHALLENGE_TTL_SECS";

/// Proxy behavior configuration
pub const PROXY_TIMEOUT_SECS: &str = "PROXY_TIMEOUT_SECS";
pub const MAX_BODY_SIZE_MB: &str = "MAX_BODY_SIZE_MB";
pub const MAX_REDIRECTS: &str = "MAX_REDIRECTS";
pub const VIA_HEADER: &str = "VIA_HEADER";

/// DNS allow-list
pub const ALLOWLIST_HOSTNAME: &str = "ALLOWLIST_HOSTNAME";
pub const ALLOWLIST_TTL_SECS: &str = "ALLOWLIST_TTL_SECS";

/// Response cache
pub const RESPONSE_CACHE_TTL_SECS: &str = "RESPONSE_CACHE_TTL_SECS";
pub const RESPONSE_CACHE_MAX_ENTRIES: &str = "RESPONSE_CACHE_MAX_ENTRIES";

/// Abuse rules
pub const BLOCKED_PATTERNS: &str = "BLOCKED_PATTERNS";
pub const BLOCKED_USER_AGENTS: &str = "BLOCKED_USER_AGENTS";

/// Diagnostics and connection limits
pub const ENABLE_DIAGNOSTICS: &str = "ENABLE_DIAGNOSTICS";
pub const MAX_CONNECTIONS: &str = "MAX_CONNECTIONS";

/// Get all environment variable names for documentation/validation
pub fn all_env_vars() -> &'static [&'static str] {
    &[
        PROXY_SECRETS,
        CREDENTIAL_MODE,
        CREDENTIAL_NAME,
        AUTH_REALM,
        TRUSTED_IP_HEADER,
        TRUSTED_PROXY_IPS,
        FORWARD_PLATFORM_HEADER,
        BURST_LIMIT_REQUESTS,
        BURST_LIMIT_WINDOW_SECS,
        RATE_LIMIT_REQUESTS,
        RATE_LIMIT_WINDOW_SECS,
        GLOBAL_LIMIT_REQUESTS,
        GLOBAL_LIMIT_WINDOW_SECS,
        RATE_LIMIT_CLEANUP_THRESHOLD,
        RATE_LIMIT_CLEANUP_INTERVAL_SECS,
        REPUTATION_BLOCK_THRESHOLD,
        REPUTATION_COOLDOWN_SECS,
        REPUTATION_MAX_TRACKED,
        CHALLENGE_SECRET,
        CHALLENGE_TTL_SECS,
        PROXY_TIMEOUT_SECS,
        MAX_BODY_SIZE_MB,
        MAX_REDIRECTS,
        VIA_HEADER,
        ALLOWLIST_HOSTNAME,
        ALLOWLIST_TTL_SECS,
        RESPONSE_CACHE_TTL_SECS,
        RESPONSE_CACHE_MAX_ENTRIES,
        BLOCKED_PATTERNS,
        BLOCKED_USER_AGENTS,
        ENABLE_DIAGNOSTICS,
        MAX_CONNECTIONS,
    ]
}

/// Variables whose values are never printed.
pub fn is_sensitive(var_name: &str) -> bool {
    matches!(var_name, PROXY_SECRETS | CHALLENGE_SECRET | TRUSTED_PROXY_IPS)
}
