//! Default configuration values for RelayGate.
//!
//! Shared by the environment-backed configuration and the test configuration
//! so both start from the same numbers.

use std::time::Duration;

/// Burst tier: requests per window.
pub const BURST_LIMIT_REQUESTS: u32 = 10;

/// Burst tier window in seconds.
pub const BURST_LIMIT_WINDOW_SECS: u64 = 1;

/// Per-client tier: requests per window.
pub const RATE_LIMIT_REQUESTS: u32 = 60;

/// Per-client tier window in seconds.
pub const RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Global tier: requests per window, all clients combined.
pub const GLOBAL_LIMIT_REQUESTS: u32 = 1000;

/// Global tier window in seconds.
pub const GLOBAL_LIMIT_WINDOW_SECS: u64 = 60;

/// Entries in the in-process counter store before a sweep is considered.
pub const RATE_LIMIT_CLEANUP_THRESHOLD: usize = 10_000;

/// Minimum seconds between two sweeps of the in-process counter store.
pub const RATE_LIMIT_CLEANUP_INTERVAL_SECS: u64 = 60;

/// Default cleanup interval duration.
pub const RATE_LIMIT_CLEANUP_INTERVAL: Duration =
    Duration::from_secs(RATE_LIMIT_CLEANUP_INTERVAL_SECS);

/// Violations above which a client is blocked.
pub const REPUTATION_BLOCK_THRESHOLD: u32 = 200;

/// Seconds of inactivity after which a blocked client is released.
pub const REPUTATION_COOLDOWN_SECS: u64 = 3600;

/// Maximum number of client identities tracked at once.
pub const REPUTATION_MAX_TRACKED: usize = 1000;

/// Violation reasons kept per client.
pub const REPUTATION_HISTORY_LEN: usize = 20;

/// Challenge token time bucket in seconds.
pub const CHALLENGE_TTL_SECS: u64 = 300;

/// Name of the cookie carrying the challenge token.
pub const CHALLENGE_COOKIE: &str = "__rg_challenge";

/// Default upstream timeout in seconds.
pub const PROXY_TIMEOUT_SECS: u64 = 30;

/// Default upstream timeout duration.
pub const PROXY_TIMEOUT: Duration = Duration::from_secs(PROXY_TIMEOUT_SECS);

/// Default maximum body size in megabytes.
pub const MAX_BODY_SIZE_MB: usize = 10;

/// Default maximum body size in bytes.
pub const MAX_BODY_SIZE: usize = MAX_BODY_SIZE_MB * 1024 * 1024;

/// Redirects followed before the upstream response is relayed as-is.
pub const MAX_REDIRECTS: usize = 10;

/// Value of the diagnostic `x-proxied-by` response header.
pub const VIA_HEADER: &str = "relaygate";

/// Platform header carrying the verified client address.
pub const TRUSTED_IP_HEADER: &str = "cf-connecting-ip";

/// Query parameter name used in query credential mode.
pub const CREDENTIAL_QUERY_PARAM: &str = "key";

/// Header name used in header credential mode.
pub const CREDENTIAL_HEADER: &str = "x-proxy-key";

/// Default authentication realm.
pub const AUTH_REALM: &str = "RelayGate";

/// Seconds an allow-list hostname resolution stays fresh.
pub const ALLOWLIST_TTL_SECS: u64 = 300;

/// Seconds a cached response stays fresh.
pub const RESPONSE_CACHE_TTL_SECS: u64 = 60;

/// Maximum number of cached responses.
pub const RESPONSE_CACHE_MAX_ENTRIES: usize = 1024;

/// Default maximum concurrent connections.
pub const MAX_CONNECTIONS: usize = 10_000;

/// Browser-like user agent supplied when the caller sends none.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Browser-like accept header supplied when the caller sends none.
pub const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
