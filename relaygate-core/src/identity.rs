//! Client identity resolution.
//!
//! The identity is the key for rate-limit counters and reputation records,
//! so it must never come from a header the caller can set freely.
//!
//! # Security Model
//!
//! ## Direct Mode (no trusted proxies configured, the default)
//! - The platform header is ignored
//! - The TCP peer address is the identity, `"unknown"` without one
//!
//! ## Strict Mode (trusted proxy allowlist configured)
//! - The trusted platform header is honoured only when the TCP peer is one
//!   of the allowed proxies
//! - Otherwise the TCP peer address itself is the identity
//!
//! ## Any-Peer Mode (allowlist contains [`ANY_PROXY`])
//! - The platform header is honoured from every peer; only safe when the
//!   edge platform is the sole way to reach the listener
//! - Falls back to the TCP peer address, then to `"unknown"`
//!
//! `x-forwarded-for`, `x-real-ip` and `forwarded` are never consulted.

use std::fmt;
use std::net::IpAddr;

use hyper::HeaderMap;

use crate::types::ProxyProvider;

/// Identity used when neither the platform header nor the peer address is available.
pub const UNKNOWN: &str = "unknown";

/// Trusted-proxy entry that trusts the platform header from every peer.
pub const ANY_PROXY: &str = "*";

/// TCP peer address of the inbound connection.
///
/// The accept loop stores it as a request extension so the pipeline can
/// read it without depending on the listener type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeerAddr(pub IpAddr);

/// Trusted caller identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    /// Wraps an already-validated identity string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The placeholder identity shared by every unidentifiable caller.
    pub fn unknown() -> Self {
        Self(UNKNOWN.to_string())
    }

    /// Returns the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for the `"unknown"` placeholder.
    pub fn is_unknown(&self) -> bool {
        self.0 == UNKNOWN
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolves the caller's identity from the trusted header and the peer address.
///
/// # Example
///
/// ```ignore
/// use relaygate_core::identity::{resolve, PeerAddr};
///
/// let peer = req.extensions().get::<PeerAddr>().map(|p| p.0);
/// let identity = resolve(req.headers(), peer, config.as_ref());
/// ```
pub fn resolve(
    headers: &HeaderMap,
    peer: Option<IpAddr>,
    config: &impl ProxyProvider,
) -> ClientIdentity {
    let header_trusted = match config.allowed_proxy_ips() {
        Some(allowed) if trusts_any_peer(allowed) => true,
        Some(allowed) => peer.is_some_and(|p| is_proxy_ip_allowed(p, allowed)),
        None => false,
    };
    let from_header = header_trusted
        .then(|| trusted_header_ip(headers, config.trusted_ip_header()))
        .flatten();

    from_header
        .or_else(|| peer.map(|p| p.to_string()))
        .map(ClientIdentity)
        .unwrap_or_else(ClientIdentity::unknown)
}

/// Reads and normalizes the platform header value.
fn trusted_header_ip(headers: &HeaderMap, name: &str) -> Option<String> {
    if name.is_empty() {
        return None;
    }
    let raw = headers.get(name)?.to_str().ok()?;
    // Platforms send a single address; take the first entry if a list slipped through.
    let first = raw.split(',').next()?;
    normalize_ip(first)
}

/// Returns true when the allowlist opts into trusting every peer.
pub fn trusts_any_peer(allowed: &[String]) -> bool {
    allowed.iter().any(|ip| ip.trim() == ANY_PROXY)
}

/// Checks the peer against the configured proxy allowlist.
fn is_proxy_ip_allowed(peer: IpAddr, allowed: &[String]) -> bool {
    allowed
        .iter()
        .filter_map(|ip| normalize_ip(ip))
        .any(|ip| ip == peer.to_string())
}

/// Normalizes an address: strips quotes, brackets and an optional port.
/// Returns `None` for anything that is not an IP.
fn normalize_ip(value: &str) -> Option<String> {
    let value = value.trim().trim_matches('"');
    if value.is_empty() {
        return None;
    }

    // [IPv6] or [IPv6]:port
    if let Some(rest) = value.strip_prefix('[') {
        let end = rest.find(']')?;
        return rest[..end].parse::<IpAddr>().ok().map(|ip| ip.to_string());
    }

    // IPv4:port
    if value.matches(':').count() == 1 {
        let (ip, _) = value.split_once(':')?;
        return ip.parse::<IpAddr>().ok().map(|ip| ip.to_string());
    }

    value.parse::<IpAddr>().ok().map(|ip| ip.to_string())
}
