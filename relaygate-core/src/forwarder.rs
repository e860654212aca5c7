//! Outbound fetch.
//!
//! The pipeline talks to upstreams through [`UpstreamClient`], so tests can
//! substitute an in-process upstream. [`ReqwestForwarder`] is the production
//! implementation: a pooled `reqwest` client with a hard timeout covering
//! the whole exchange, including the response body. Bodies are read chunk
//! by chunk and abandoned once they pass the configured maximum.
//!
//! Redirects are followed up to the configured limit. A redirect whose
//! location is a private or local address is not followed; the 3xx is
//! relayed to the caller instead. Proxy environment variables are ignored.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use hyper::{HeaderMap, StatusCode};
use reqwest::redirect::Policy;
use tracing::{debug, warn};

use crate::address_policy;
use crate::error::{GatewayError, Result};
use crate::rewrite::TargetRequest;
use crate::types::ProxyConfig;

/// A fully buffered upstream response.
#[derive(Clone, Debug)]
pub struct UpstreamResponse {
    /// Upstream status
    pub status: StatusCode,
    /// Upstream headers, unfiltered
    pub headers: HeaderMap,
    /// Upstream body
    pub body: Bytes,
}

/// HTTP client capability used by the pipeline.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Performs the request.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::UpstreamTimeout`] when the exchange exceeds the timeout
    /// - [`GatewayError::UpstreamUnreachable`] for any other transport failure
    async fn send(&self, request: TargetRequest) -> Result<UpstreamResponse>;
}

/// `reqwest`-backed upstream client with connection pooling.
#[derive(Clone, Debug)]
pub struct ReqwestForwarder {
    client: reqwest::Client,
    timeout: Duration,
    max_body_size: usize,
}

impl ReqwestForwarder {
    /// Builds the client from the proxy configuration.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ConfigError`] if the TLS backend cannot be initialized.
    pub fn new(config: &ProxyConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(redirect_policy(config.max_redirects))
            .no_proxy()
            .build()
            .map_err(|e| GatewayError::ConfigError(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            timeout: config.timeout,
            max_body_size: config.max_body_size,
        })
    }
}

fn redirect_policy(max_redirects: usize) -> Policy {
    if max_redirects == 0 {
        return Policy::none();
    }
    Policy::custom(move |attempt| {
        if attempt.previous().len() > max_redirects {
            attempt.error("too many redirects")
        } else if address_policy::check_target(attempt.url()).is_err() {
            attempt.stop()
        } else {
            attempt.follow()
        }
    })
}

fn map_error(e: reqwest::Error, timeout: Duration) -> GatewayError {
    if e.is_timeout() {
        GatewayError::UpstreamTimeout(format!("no response within {}s", timeout.as_secs()))
    } else {
        GatewayError::UpstreamUnreachable(e.without_url().to_string())
    }
}

impl ReqwestForwarder {
    /// Buffers the body, up to `max_body_size` bytes (0 = unlimited).
    async fn read_body(&self, mut response: reqwest::Response) -> Result<Bytes> {
        let max = self.max_body_size;
        let over = |len: usize| max > 0 && len > max;

        if let Some(declared) = response.content_length()
            && over(usize::try_from(declared).unwrap_or(usize::MAX))
        {
            return Err(GatewayError::UpstreamTooLarge { max });
        }

        let mut body = BytesMut::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| map_error(e, self.timeout))?
        {
            if over(body.len().saturating_add(chunk.len())) {
                return Err(GatewayError::UpstreamTooLarge { max });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }
}

#[async_trait]
impl UpstreamClient for ReqwestForwarder {
    async fn send(&self, request: TargetRequest) -> Result<UpstreamResponse> {
        let host = request.url.host_str().unwrap_or_default().to_string();
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| map_error(e, self.timeout))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = self.read_body(response).await.inspect_err(|e| {
            if matches!(e, GatewayError::UpstreamTooLarge { .. }) {
                warn!(target_host = %host, max = self.max_body_size, "Upstream body over limit, dropped");
            }
        })?;

        debug!(target_host = %host, status = status.as_u16(), bytes = body.len(), "Upstream responded");
        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}
