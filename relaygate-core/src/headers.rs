//! HTTP header constants for RelayGate.
//!
//! Centralizes header names and the strip lists applied to inbound requests
//! and upstream responses. All names are lowercase, matching how
//! [`hyper::HeaderMap`] normalizes them.

/// X-Forwarded-For header - re-injected with the verified client identity.
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// X-Real-IP header - stripped, never trusted from callers.
pub const X_REAL_IP: &str = "x-real-ip";

/// Forwarded header (RFC 7239).
pub const FORWARDED: &str = "forwarded";

/// Authorization header (Basic credentials in header mode).
pub const AUTHORIZATION: &str = "authorization";

/// WWW-Authenticate header (interactive credential prompt).
pub const WWW_AUTHENTICATE: &str = "www-authenticate";

/// Content-Type header.
pub const CONTENT_TYPE: &str = "content-type";

/// Host header.
pub const HOST: &str = "host";

/// Origin header.
pub const ORIGIN: &str = "origin";

/// Referer header.
pub const REFERER: &str = "referer";

/// User-Agent header.
pub const USER_AGENT: &str = "user-agent";

/// Accept header.
pub const ACCEPT: &str = "accept";

/// Cookie header.
pub const COOKIE: &str = "cookie";

/// Set-Cookie header.
pub const SET_COOKIE: &str = "set-cookie";

/// Cache-Control header.
pub const CACHE_CONTROL: &str = "cache-control";

/// Retry-After header, sent with rate-limit rejections.
pub const RETRY_AFTER: &str = "retry-after";

/// Refresh header, sent with the browser challenge.
pub const REFRESH: &str = "refresh";

/// Content-Length header.
pub const CONTENT_LENGTH: &str = "content-length";

/// Diagnostic header identifying the proxy on relayed responses.
pub const X_PROXIED_BY: &str = "x-proxied-by";

/// Connection header (hop-by-hop).
pub const CONNECTION: &str = "connection";

/// Keep-Alive header (hop-by-hop).
pub const KEEP_ALIVE: &str = "keep-alive";

/// Proxy-Authenticate header (hop-by-hop).
pub const PROXY_AUTHENTICATE: &str = "proxy-authenticate";

/// Proxy-Authorization header (hop-by-hop).
pub const PROXY_AUTHORIZATION: &str = "proxy-authorization";

/// TE header (hop-by-hop).
pub const TE: &str = "te";

/// Trailers header (hop-by-hop).
pub const TRAILERS: &str = "trailers";

/// Transfer-Encoding header (hop-by-hop).
pub const TRANSFER_ENCODING: &str = "transfer-encoding";

/// Upgrade header (hop-by-hop).
pub const UPGRADE: &str = "upgrade";

/// List of all hop-by-hop headers that should not be forwarded.
pub const HOP_BY_HOP_HEADERS: &[&str] = &[
    CONNECTION,
    KEEP_ALIVE,
    PROXY_AUTHENTICATE,
    PROXY_AUTHORIZATION,
    TE,
    TRAILERS,
    TRANSFER_ENCODING,
    UPGRADE,
];

/// Headers that leak the caller's identity or origin, or that a CDN
/// platform sets to vouch for the connection. Never forwarded upstream.
pub const IDENTITY_HEADERS: &[&str] = &[
    HOST,
    ORIGIN,
    REFERER,
    X_FORWARDED_FOR,
    X_REAL_IP,
    FORWARDED,
    "x-forwarded-host",
    "x-forwarded-proto",
    "x-client-ip",
    "true-client-ip",
    "cf-connecting-ip",
    "cf-connecting-ipv6",
    "cf-ray",
    "cf-visitor",
    "cf-ipcountry",
    "cf-worker",
    "cf-ew-via",
    "cdn-loop",
];

/// Upstream response headers that break cross-origin consumption.
pub const SCRUBBED_RESPONSE_HEADERS: &[&str] = &[
    "content-security-policy",
    "content-security-policy-report-only",
    "x-frame-options",
    "x-content-type-options",
];

/// Check if a header is a hop-by-hop header that shouldn't be forwarded.
///
/// # Example
///
/// ```
/// use relaygate_core::headers::is_hop_by_hop;
///
/// assert!(is_hop_by_hop("connection"));
/// assert!(is_hop_by_hop("transfer-encoding"));
/// assert!(!is_hop_by_hop("content-type"));
/// ```
pub fn is_hop_by_hop(header_name: &str) -> bool {
    HOP_BY_HOP_HEADERS.contains(&header_name)
}

/// Check if a header identifies the caller and must be stripped outbound.
pub fn is_identity_header(header_name: &str) -> bool {
    IDENTITY_HEADERS.contains(&header_name)
}

/// Check if an upstream response header is removed before relaying.
pub fn is_scrubbed_response_header(header_name: &str) -> bool {
    SCRUBBED_RESPONSE_HEADERS.contains(&header_name)
}
