//! Response construction: relayed upstream responses, errors, preflight.
//!
//! Every response the gateway emits carries permissive CORS headers, so a
//! browser-side caller can read errors instead of seeing an opaque network
//! failure.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::HeaderValue;
use hyper::{HeaderMap, Method, Response, StatusCode};
use serde_json::json;

use crate::error::GatewayError;
use crate::forwarder::UpstreamResponse;
use crate::headers;
use crate::types::ProxyConfig;

/// Body type of every gateway response.
pub type GatewayBody = Full<Bytes>;

/// Access-Control-Allow-Origin header.
pub const ACCESS_CONTROL_ALLOW_ORIGIN: &str = "access-control-allow-origin";
/// Access-Control-Allow-Methods header.
pub const ACCESS_CONTROL_ALLOW_METHODS: &str = "access-control-allow-methods";
/// Access-Control-Allow-Headers header.
pub const ACCESS_CONTROL_ALLOW_HEADERS: &str = "access-control-allow-headers";
/// Access-Control-Expose-Headers header.
pub const ACCESS_CONTROL_EXPOSE_HEADERS: &str = "access-control-expose-headers";
/// Access-Control-Max-Age header.
pub const ACCESS_CONTROL_MAX_AGE: &str = "access-control-max-age";

const ALLOWED_METHODS: &str = "GET, HEAD, POST, PUT, PATCH, DELETE, OPTIONS";

/// Overwrites the CORS headers on `headers`.
pub fn apply_cors(headers: &mut HeaderMap) {
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOWED_METHODS),
    );
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_EXPOSE_HEADERS, HeaderValue::from_static("*"));
}

/// Adds CORS headers to an already built response.
pub fn with_cors(mut response: Response<GatewayBody>) -> Response<GatewayBody> {
    apply_cors(response.headers_mut());
    response
}

/// `204 No Content` answer to a CORS preflight.
pub fn preflight() -> Response<GatewayBody> {
    let response = Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header(ACCESS_CONTROL_MAX_AGE, "86400")
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())));
    with_cors(response)
}

/// JSON response with CORS headers.
pub fn json_response(status: StatusCode, value: &serde_json::Value) -> Response<GatewayBody> {
    let response = Response::builder()
        .status(status)
        .header(headers::CONTENT_TYPE, "application/json")
        .header(headers::CACHE_CONTROL, "no-store")
        .body(Full::new(Bytes::from(value.to_string())))
        .unwrap_or_else(|_| {
            Response::new(Full::new(Bytes::from_static(b"Internal Server Error")))
        });
    with_cors(response)
}

/// Renders an error as `{"error": "<message>"}`.
///
/// Only [`GatewayError::user_message`] reaches the body. Rate-limit
/// rejections carry `retry-after` set to the tier's window.
///
/// # Example
///
/// ```
/// use relaygate_core::error::GatewayError;
/// use relaygate_core::response::error_response;
/// use hyper::StatusCode;
///
/// let response = error_response(&GatewayError::MissingTarget);
/// assert_eq!(response.status(), StatusCode::BAD_REQUEST);
/// assert_eq!(response.headers()["access-control-allow-origin"], "*");
/// ```
pub fn error_response(err: &GatewayError) -> Response<GatewayBody> {
    let mut response = json_response(err.status_code(), &json!({ "error": err.user_message() }));
    if let GatewayError::RateLimited { window_secs, .. } = err
        && let Ok(v) = HeaderValue::from_str(&window_secs.to_string())
    {
        response.headers_mut().insert(headers::RETRY_AFTER, v);
    }
    response
}

/// Builds the client-facing response from an upstream response.
///
/// Drops hop-by-hop headers, `content-length` (recomputed from the body)
/// and the headers that break cross-origin use, then adds CORS and the
/// optional `x-proxied-by` header.
///
/// A HEAD answer has no body to recompute from, so its upstream
/// `content-length` is kept.
pub fn relay(
    upstream: UpstreamResponse,
    method: &Method,
    config: &ProxyConfig,
) -> Response<GatewayBody> {
    let keep_length = *method == Method::HEAD;
    let mut out = HeaderMap::with_capacity(upstream.headers.len() + 5);
    for (name, value) in &upstream.headers {
        let n = name.as_str();
        if headers::is_hop_by_hop(n)
            || (n == headers::CONTENT_LENGTH && !keep_length)
            || headers::is_scrubbed_response_header(n)
        {
            continue;
        }
        out.append(name.clone(), value.clone());
    }

    apply_cors(&mut out);
    if let Some(via) = config.via_header.as_deref().filter(|v| !v.is_empty())
        && let Ok(v) = HeaderValue::from_str(via)
    {
        out.insert(headers::X_PROXIED_BY, v);
    }

    let mut response = Response::new(Full::new(upstream.body));
    *response.status_mut() = upstream.status;
    *response.headers_mut() = out;
    response
}
