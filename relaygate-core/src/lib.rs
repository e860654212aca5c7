//! RelayGate Core - admission, rewriting and forwarding pipeline
//!
//! This crate provides the request pipeline of an edge forward proxy:
//! - Target URL resolution from the path or the `url` query parameter
//! - Private-address (SSRF) blocking of targets
//! - Shared-secret credential gate (path segment, query parameter or header)
//! - Burst, per-client and global rate limiting over a pluggable counter store
//! - Client reputation with a browser challenge and temporary blocking
//! - Header sanitization, CORS, and a local response cache
//!
//! # Overview
//!
//! `relaygate-core` does not own a listener. Configuration is provided via the
//! [`ConfigProvider`] trait, and every inbound request is handed to
//! [`Gateway::handle`], which always returns a response.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use relaygate_core::{ConfigProvider, Gateway};
//!
//! fn build<C: ConfigProvider>(config: C) -> relaygate_core::Result<Arc<Gateway<C>>> {
//!     let gateway = Gateway::new(Arc::new(config))?;
//!     // Serve `gateway.handle(request)` from any hyper-compatible server.
//!     Ok(Arc::new(gateway))
//! }
//! ```
//!
//! # Modules
//!
//! - [`pipeline`] - The [`Gateway`] and its fixed request sequence
//! - [`types`] - Configuration structs and provider traits
//! - [`error`] - Error taxonomy and HTTP mapping
//! - [`target`] / [`address_policy`] - Destination resolution and SSRF checks
//! - [`auth`] - Credential gate
//! - [`rate_limiter`] / [`store`] - Tiered rate limiting and counter storage
//! - [`reputation`] / [`challenge`] - Violation tracking and browser challenge
//! - [`rewrite`] / [`forwarder`] / [`response`] - Outbound request, fetch, relay

#![forbid(unsafe_code)]

pub mod address_policy;
pub mod allowlist;
pub mod auth;
pub mod cache;
pub mod challenge;
pub mod defaults;
pub mod error;
pub mod forwarder;
pub mod headers;
pub mod identity;
pub mod pipeline;
pub mod rate_limiter;
pub mod reputation;
pub mod response;
pub mod rewrite;
pub mod rules;
pub mod stats;
pub mod store;
pub mod target;
pub mod tasks;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;

// Re-export commonly used items at crate root
pub use error::{GatewayError, RateLimitTier, Result};
pub use identity::{ClientIdentity, PeerAddr};
pub use pipeline::Gateway;
pub use rate_limiter::RateLimiter;
pub use reputation::ReputationTracker;
pub use tasks::BackgroundTasks;
pub use types::{
    // Aggregated configuration trait
    ConfigProvider,
    // Composable configuration traits
    AuthenticationProvider,
    CacheProvider,
    ConnectionProvider,
    FilteringProvider,
    ProxyProvider,
    RateLimitingProvider,
    ReputationProvider,
    // Configuration structs
    AllowlistConfig,
    CacheConfig,
    ChallengeConfig,
    CredentialConfig,
    CredentialMode,
    ProxyConfig,
    RateLimitCleanupConfig,
    RateLimitConfig,
    ReputationConfig,
};
