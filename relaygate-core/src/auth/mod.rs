//! Credential gate.
//!
//! Validates the shared secret a caller presents before anything is
//! forwarded. The secret travels through exactly one channel per deployment
//! (see [`CredentialMode`]): the first path segment, a query parameter, or a
//! request header. In header mode the secret may also be sent as the
//! password of an `Authorization: Basic` header, which lets a browser show
//! its native credential prompt.
//!
//! The presented value is never logged and never forwarded upstream: the
//! returned [`Admission`] tells the rewriter which header to drop, and the
//! target resolver skips the path segment or query parameter.

pub mod hash;

use base64::{Engine, engine::general_purpose::STANDARD};
use hyper::{HeaderMap, Method, Response, StatusCode};
use http_body_util::Full;
use bytes::Bytes;
use url::form_urlencoded;

use crate::error::{GatewayError, Result};
use crate::headers;
use crate::types::{CredentialConfig, CredentialMode};

/// Set of accepted secrets.
#[derive(Clone, Default)]
pub struct Secrets {
    entries: Vec<String>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("count", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl Secrets {
    /// Creates an empty secret set, which rejects every caller.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set from already-split entries.
    pub fn from_entries(entries: Vec<String>) -> Self {
        Self { entries }
    }

    /// Parses a comma-separated list, ignoring blank entries.
    pub fn parse(input: &str) -> Self {
        Self::from_entries(
            input
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        )
    }

    /// Returns true if no secrets are configured.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of configured secrets.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Number of entries stored as hashes.
    pub fn hashed_count(&self) -> usize {
        self.entries.iter().filter(|e| hash::is_hashed(e)).count()
    }

    /// Checks the presented value against every entry.
    ///
    /// All entries are always evaluated so the timing does not reveal
    /// which one matched.
    pub fn matches(&self, presented: &str) -> bool {
        let mut found = false;
        for stored in &self.entries {
            if hash::verify(presented, stored) {
                found = true;
            }
        }
        found
    }
}

/// What a successful credential check leaves behind for the rest of the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Admission {
    /// Inbound header that carried the credential, dropped before forwarding.
    pub credential_header: Option<String>,
}

/// Validates the caller's credential.
///
/// # Errors
///
/// Returns [`GatewayError::Unauthorized`] when the credential is absent,
/// malformed, or does not match any configured secret.
pub fn authenticate(
    path: &str,
    query: Option<&str>,
    headers: &HeaderMap,
    config: &CredentialConfig,
) -> Result<Admission> {
    match &config.mode {
        CredentialMode::PathSegment => {
            let Some(segment) = path.split('/').find(|s| !s.is_empty()) else {
                return Err(GatewayError::Unauthorized("missing key".into()));
            };
            check(segment, &config.secrets)?;
            Ok(Admission::default())
        }
        CredentialMode::QueryParam(name) => {
            let presented = query.and_then(|q| {
                form_urlencoded::parse(q.as_bytes())
                    .find(|(k, _)| k == name.as_str())
                    .map(|(_, v)| v.into_owned())
            });
            let Some(presented) = presented else {
                return Err(GatewayError::Unauthorized("missing key".into()));
            };
            check(&presented, &config.secrets)?;
            Ok(Admission::default())
        }
        CredentialMode::Header(name) => {
            if let Some(value) = headers.get(name.as_str()) {
                let presented = value
                    .to_str()
                    .map_err(|_| GatewayError::Unauthorized("malformed key header".into()))?;
                check(presented.trim(), &config.secrets)?;
                return Ok(Admission {
                    credential_header: Some(name.clone()),
                });
            }

            let Some(basic) = headers
                .get(headers::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(basic_password)
            else {
                return Err(GatewayError::Unauthorized("missing key".into()));
            };
            check(&basic, &config.secrets)?;
            Ok(Admission {
                credential_header: Some(headers::AUTHORIZATION.to_string()),
            })
        }
    }
}

fn check(presented: &str, secrets: &Secrets) -> Result<()> {
    if presented.is_empty() || !secrets.matches(presented) {
        return Err(GatewayError::Unauthorized("invalid key".into()));
    }
    Ok(())
}

/// Extracts the password part of an `Authorization: Basic` header (RFC 7617).
/// The user part is ignored.
fn basic_password(auth_header: &str) -> Option<String> {
    let encoded = auth_header.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (_, password) = decoded.split_once(':')?;
    Some(password.to_string())
}

/// Returns true if a failed check should answer with an interactive prompt
/// instead of a bare error.
///
/// Only header mode can prompt, and only for safe reads: a browser cannot
/// resubmit a request body after the user types the credential.
pub fn should_prompt(mode: &CredentialMode, method: &Method) -> bool {
    matches!(mode, CredentialMode::Header(_)) && (*method == Method::GET || *method == Method::HEAD)
}

/// Builds the interactive credential prompt.
pub fn prompt_response(realm: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({ "error": "Unauthorized" }).to_string();
    let challenge = format!("Basic realm=\"{}\", charset=\"UTF-8\"", realm.replace('"', ""));
    Response::builder()
        .status(StatusCode::UNAUTHORIZED)
        .header(headers::WWW_AUTHENTICATE, challenge)
        .header(headers::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"Unauthorized"))))
}
