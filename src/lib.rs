//! RelayGate - an edge forward proxy
//!
//! Callers request `/{secret}/{target-url}` and RelayGate fetches the target
//! on their behalf, after credential, address and abuse checks.
//!
//! # Overview
//!
//! This crate is the runnable shell around [`relaygate_core`]:
//! - Configuration from environment variables ([`config::EnvVarConfig`])
//! - The command line interface ([`args`])
//! - The TCP listener, connection limits and graceful shutdown ([`server`])
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use relaygate::{config::EnvVarConfig, server, Gateway};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let gateway = Arc::new(Gateway::new(Arc::new(EnvVarConfig::new()))?);
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! server::serve(listener, gateway, async {
//!     let _ = tokio::signal::ctrl_c().await;
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`config`] - Configuration management from environment variables
//! - [`env_vars`] - Environment variable constants
//! - [`server`] - Accept loop, shutdown and startup banner
//! - [`connection`] - Connection limiting and tracking
//! - [`args`] - Command line argument parsing

#![forbid(unsafe_code)]

pub mod args;
pub mod config;
pub mod connection;
pub mod env_vars;
pub mod server;

pub use relaygate_core::types;

// Re-export commonly used items at crate root
pub use config::{
    EnvVarConfig, get_allowed_proxy_ips, get_blocked_patterns, get_credential_config,
    get_max_connections, get_proxy_config, get_rate_limit_cleanup_config,
};
pub use relaygate_core::{
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
    ProxyConfig,
    RateLimitCleanupConfig,
    RateLimitConfig,
    // Pipeline
    Gateway,
    GatewayError,
};
