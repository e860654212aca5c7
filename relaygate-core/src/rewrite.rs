//! Outbound request construction.
//!
//! [`TargetRequest::build`] derives a fresh outbound request from the inbound
//! one. The inbound headers are only read, never mutated, so nothing the
//! caller sent can leak through aliasing.
//!
//! Header policy:
//! - Dropped: identity and platform-trust headers, hop-by-hop headers
//!   (including any named in `connection`), `content-length`, the header
//!   that carried the credential, and the challenge cookie
//! - Injected: `x-forwarded-for` with the verified identity, optionally the
//!   platform header, `host` of the target
//! - Defaulted when absent: `user-agent`, `accept`

use bytes::Bytes;
use hyper::header::{HeaderName, HeaderValue};
use hyper::{HeaderMap, Method};
use url::Url;

use crate::auth::Admission;
use crate::challenge;
use crate::defaults;
use crate::headers;
use crate::identity::ClientIdentity;
use crate::types::ProxyProvider;

/// A sanitized request ready for the forwarder.
#[derive(Clone, Debug)]
pub struct TargetRequest {
    /// Method, unchanged from the inbound request
    pub method: Method,
    /// Validated absolute http(s) URL
    pub url: Url,
    /// Sanitized outbound headers
    pub headers: HeaderMap,
    /// Opaque body, only for methods other than GET and HEAD
    pub body: Option<Bytes>,
}

impl TargetRequest {
    /// Builds the outbound request.
    pub fn build(
        method: Method,
        url: Url,
        inbound: &HeaderMap,
        body: Bytes,
        identity: &ClientIdentity,
        admission: &Admission,
        config: &impl ProxyProvider,
    ) -> Self {
        let headers = outbound_headers(inbound, &url, identity, admission, config);
        let body = if is_safe_read(&method) { None } else { Some(body) };
        Self {
            method,
            url,
            headers,
            body,
        }
    }

    /// Cache key: method and full URL.
    pub fn cache_key(&self) -> String {
        format!("{} {}", self.method, self.url)
    }

    /// Whether the outbound request carries caller credentials for the target.
    ///
    /// Answers to such requests may be personalised and are never shared
    /// through the cache.
    pub fn carries_credentials(&self) -> bool {
        self.headers.contains_key(headers::AUTHORIZATION)
            || self.headers.contains_key(headers::COOKIE)
    }
}

/// GET and HEAD never carry a forwarded body.
pub fn is_safe_read(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD
}

/// Computes the outbound header map.
pub fn outbound_headers(
    inbound: &HeaderMap,
    target: &Url,
    identity: &ClientIdentity,
    admission: &Admission,
    config: &impl ProxyProvider,
) -> HeaderMap {
    let trusted_header = config.trusted_ip_header().to_ascii_lowercase();
    let connection_listed = connection_tokens(inbound);
    let mut out = HeaderMap::with_capacity(inbound.len() + 4);

    for (name, value) in inbound {
        let n = name.as_str();
        if headers::is_identity_header(n)
            || headers::is_hop_by_hop(n)
            || n == headers::CONTENT_LENGTH
            || n == trusted_header
            || admission.credential_header.as_deref() == Some(n)
            || connection_listed.iter().any(|t| t == n)
        {
            continue;
        }

        if n == headers::COOKIE {
            if let Some(kept) = value.to_str().ok().and_then(challenge::strip_cookie)
                && let Ok(v) = HeaderValue::from_str(&kept)
            {
                out.append(name.clone(), v);
            }
            continue;
        }

        out.append(name.clone(), value.clone());
    }

    if !identity.is_unknown()
        && let Ok(v) = HeaderValue::from_str(identity.as_str())
    {
        out.insert(headers::X_FORWARDED_FOR, v.clone());
        if config.forward_platform_header()
            && let Ok(name) = HeaderName::from_bytes(trusted_header.as_bytes())
        {
            out.insert(name, v);
        }
    }

    if let Some(host) = host_header(target)
        && let Ok(v) = HeaderValue::from_str(&host)
    {
        out.insert(headers::HOST, v);
    }

    if !out.contains_key(headers::USER_AGENT) {
        out.insert(
            headers::USER_AGENT,
            HeaderValue::from_static(defaults::USER_AGENT),
        );
    }
    if !out.contains_key(headers::ACCEPT) {
        out.insert(headers::ACCEPT, HeaderValue::from_static(defaults::ACCEPT));
    }

    out
}

/// `host[:port]`, with the port only when it is not the scheme default.
fn host_header(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Header names listed in the inbound `connection` header.
fn connection_tokens(inbound: &HeaderMap) -> Vec<String> {
    inbound
        .get_all(headers::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|t| t.trim().to_ascii_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}
