//! Proof-of-browser challenge.
//!
//! A moderately suspicious client receives a signed token in a cookie and
//! an instruction to reload. A browser resends the cookie automatically, most
//! scripted clients do not. Tokens are never stored: the gateway recomputes
//! the expected value from the client identity and the current time bucket.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use bytes::Bytes;
use hmac::{Hmac, Mac};
use http_body_util::Full;
use hyper::{HeaderMap, Response, StatusCode};
use sha2::Sha256;

use crate::auth::hash::constant_time_eq;
use crate::defaults::CHALLENGE_COOKIE;
use crate::headers;
use crate::identity::ClientIdentity;
use crate::types::ChallengeConfig;

type HmacSha256 = Hmac<Sha256>;

/// Time bucket containing `unix_secs`.
fn bucket(unix_secs: u64, config: &ChallengeConfig) -> u64 {
    unix_secs / config.token_ttl.as_secs().max(1)
}

/// Computes the token for `identity` in `bucket`.
fn sign(identity: &ClientIdentity, bucket: u64, config: &ChallengeConfig) -> String {
    let Ok(mut mac) = <HmacSha256 as Mac>::new_from_slice(&config.secret) else {
        return String::new();
    };
    mac.update(identity.as_str().as_bytes());
    mac.update(b":");
    mac.update(bucket.to_string().as_bytes());
    URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
}

/// Issues a token valid for the current bucket and the next one.
pub fn issue_token(identity: &ClientIdentity, unix_secs: u64, config: &ChallengeConfig) -> String {
    sign(identity, bucket(unix_secs, config), config)
}

/// Verifies a presented token against the current and previous bucket.
pub fn verify_token(
    identity: &ClientIdentity,
    token: &str,
    unix_secs: u64,
    config: &ChallengeConfig,
) -> bool {
    if token.is_empty() {
        return false;
    }
    let current = bucket(unix_secs, config);
    [Some(current), current.checked_sub(1)]
        .into_iter()
        .flatten()
        .any(|b| constant_time_eq(sign(identity, b, config).as_bytes(), token.as_bytes()))
}

/// Extracts the challenge cookie value from the request headers.
pub fn cookie_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(headers::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == CHALLENGE_COOKIE)
        .map(|(_, value)| value)
}

/// Removes the challenge cookie from a `cookie` header value.
///
/// Returns `None` when nothing else is left.
pub fn strip_cookie(cookie_header: &str) -> Option<String> {
    let kept: Vec<&str> = cookie_header
        .split(';')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .filter(|pair| pair.split_once('=').map_or(*pair, |(n, _)| n) != CHALLENGE_COOKIE)
        .collect();
    if kept.is_empty() {
        None
    } else {
        Some(kept.join("; "))
    }
}

/// Builds the challenge response carrying a fresh token.
pub fn challenge_response(
    identity: &ClientIdentity,
    unix_secs: u64,
    config: &ChallengeConfig,
) -> Response<Full<Bytes>> {
    let token = issue_token(identity, unix_secs, config);
    let cookie = format!(
        "{CHALLENGE_COOKIE}={token}; Max-Age={}; Path=/; HttpOnly; SameSite=Lax",
        config.token_ttl.as_secs()
    );
    let body = serde_json::json!({ "error": "Browser verification required" }).to_string();

    Response::builder()
        .status(StatusCode::FORBIDDEN)
        .header(headers::CONTENT_TYPE, "application/json")
        .header(headers::SET_COOKIE, cookie)
        .header(headers::REFRESH, "1")
        .header(headers::CACHE_CONTROL, "no-store")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"Forbidden"))))
}
