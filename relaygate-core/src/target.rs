//! Target URL resolution.
//!
//! The destination is taken from the `url` query parameter when present,
//! otherwise from the path segments that follow the credential segment:
//!
//! ```text
//! /KEY/?url=https://example.com/a   -> https://example.com/a
//! /KEY/example.com/a?b=1            -> https://example.com/a?b=1
//! /KEY/https://example.com/a        -> https://example.com/a
//! ```
//!
//! A missing scheme defaults to `https://`. Only `http` and `https` targets
//! are accepted.

use url::{Url, form_urlencoded};

use crate::error::{GatewayError, Result};
use crate::types::CredentialMode;

/// Query parameter carrying an explicit target.
pub const TARGET_PARAM: &str = "url";

/// Resolves the destination URL of an inbound request.
///
/// # Errors
///
/// - [`GatewayError::MissingTarget`] when neither channel yields a value
/// - [`GatewayError::InvalidTarget`] when the value does not parse or uses
///   a scheme other than `http`/`https`
///
/// # Example
///
/// ```
/// use relaygate_core::target::resolve;
/// use relaygate_core::types::CredentialMode;
///
/// let url = resolve("/KEY/example.com", None, &CredentialMode::PathSegment).unwrap();
/// assert_eq!(url.as_str(), "https://example.com/");
/// ```
pub fn resolve(path: &str, query: Option<&str>, mode: &CredentialMode) -> Result<Url> {
    let raw = match query_target(query) {
        Some(target) => target,
        None => path_target(path, query, mode),
    };

    let raw = raw.trim();
    if raw.is_empty() {
        return Err(GatewayError::MissingTarget);
    }

    parse_target(raw)
}

/// Value of the `url` query parameter, if present and non-empty.
fn query_target(query: Option<&str>) -> Option<String> {
    form_urlencoded::parse(query?.as_bytes())
        .find(|(k, _)| k == TARGET_PARAM)
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.trim().is_empty())
}

/// Path remainder after the credential segment, with the caller's query re-appended.
fn path_target(path: &str, query: Option<&str>, mode: &CredentialMode) -> String {
    let trimmed = path.trim_start_matches('/');
    let remainder = match mode {
        CredentialMode::PathSegment => trimmed.split_once('/').map_or("", |(_, rest)| rest),
        _ => trimmed,
    }
    .trim_start_matches('/');

    let mut target = repair_collapsed_scheme(remainder);
    if target.is_empty() {
        return target;
    }

    let credential_param = match mode {
        CredentialMode::QueryParam(name) => Some(name.as_str()),
        _ => None,
    };
    let forwarded_query = filter_query(query.unwrap_or_default(), credential_param);
    if !forwarded_query.is_empty() && !target.contains('?') {
        target.push('?');
        target.push_str(&forwarded_query);
    }
    target
}

/// Restores `https:/host` to `https://host`.
///
/// Some clients and intermediaries merge consecutive slashes in the path,
/// turning an embedded `https://host` into `https:/host`.
fn repair_collapsed_scheme(remainder: &str) -> String {
    for scheme in ["https:", "http:"] {
        if remainder.len() > scheme.len()
            && remainder[..scheme.len()].eq_ignore_ascii_case(scheme)
        {
            let rest = &remainder[scheme.len()..];
            let host_and_path = rest.trim_start_matches('/');
            return format!("{scheme}//{host_and_path}");
        }
    }
    remainder.to_string()
}

/// Drops the target and credential parameters from a raw query string.
/// Remaining pairs keep their original encoding.
fn filter_query(query: &str, credential_param: Option<&str>) -> String {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| {
            let key = pair.split_once('=').map_or(*pair, |(k, _)| k);
            let decoded: String = form_urlencoded::parse(key.as_bytes())
                .map(|(k, _)| k.into_owned())
                .next()
                .unwrap_or_default();
            decoded != TARGET_PARAM && Some(decoded.as_str()) != credential_param
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Adds the default scheme and validates the result.
fn parse_target(raw: &str) -> Result<Url> {
    let with_scheme = match raw.find("://") {
        Some(idx) if is_scheme(&raw[..idx]) => raw.to_string(),
        _ => format!("https://{raw}"),
    };

    let url = Url::parse(&with_scheme).map_err(|e| GatewayError::InvalidTarget(e.to_string()))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(GatewayError::InvalidTarget(format!(
                "unsupported scheme: {other}"
            )));
        }
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(GatewayError::InvalidTarget("target has no host".into()));
    }

    Ok(url)
}

fn is_scheme(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}
