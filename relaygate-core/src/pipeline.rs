//! The request pipeline.
//!
//! [`Gateway::handle`] runs every inbound request through the same fixed
//! sequence and always produces a response:
//!
//! 1. Client identity resolution
//! 2. Pre-checks: declared body size, abuse rules
//! 3. Reputation: blocked clients are refused, suspicious ones challenged
//! 4. Rate limiting: burst, per-client, global
//! 5. CORS preflight short-circuit
//! 6. Diagnostics endpoints, when enabled
//! 7. DNS allow-list, when configured
//! 8. Credential check, target resolution, address policy
//! 9. Body read and outbound request construction
//! 10. Cache lookup, forward, response rewrite, cache insert; requests that
//!     carry `authorization` or cookies bypass the cache both ways
//!
//! Every rejection that [`affects_reputation`](GatewayError::affects_reputation)
//! records a violation against the client before the error is rendered.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::http::request::Parts;
use hyper::{HeaderMap, Method, Request, Response, StatusCode};
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::address_policy;
use crate::allowlist::{self, Allowlist, Resolver, SystemResolver};
use crate::auth;
use crate::cache::{self, ResponseCache};
use crate::challenge;
use crate::error::{GatewayError, Result};
use crate::forwarder::{ReqwestForwarder, UpstreamClient};
use crate::headers;
use crate::identity::{self, ClientIdentity, PeerAddr};
use crate::rate_limiter::RateLimiter;
use crate::reputation::ReputationTracker;
use crate::response::{self, GatewayBody};
use crate::rewrite::TargetRequest;
use crate::rules::RuleSet;
use crate::stats::{Stats, StatsSnapshot};
use crate::store::CounterStore;
use crate::target;
use crate::tasks::BackgroundTasks;
use crate::types::ConfigProvider;

/// Path of the identity diagnostics endpoint.
pub const DEBUG_IP_PATH: &str = "/_debug_ip";
/// Path of the counters endpoint.
pub const STATS_PATH: &str = "/_stats";

/// The gateway: configuration plus all shared state.
///
/// One instance serves every connection; wrap it in an [`Arc`].
pub struct Gateway<C: ConfigProvider> {
    config: Arc<C>,
    limiter: RateLimiter,
    reputation: ReputationTracker,
    rules: RuleSet,
    upstream: Arc<dyn UpstreamClient>,
    cache: Arc<ResponseCache>,
    allowlist: Option<Allowlist>,
    stats: Stats,
    tasks: BackgroundTasks,
}

impl<C: ConfigProvider> Gateway<C> {
    /// Builds a gateway that forwards with `reqwest` and resolves the
    /// allow-list through the system resolver.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ConfigError`] if the HTTP client cannot be built.
    pub fn new(config: Arc<C>) -> Result<Self> {
        let upstream = ReqwestForwarder::new(config.proxy_config())?;
        Ok(Self::with_upstream(config, Arc::new(upstream)))
    }

    /// Builds a gateway around an arbitrary upstream client.
    pub fn with_upstream(config: Arc<C>, upstream: Arc<dyn UpstreamClient>) -> Self {
        let tasks = BackgroundTasks::new();
        let limiter = RateLimiter::in_memory(config.rate_limit_cleanup_config().clone());
        let reputation = ReputationTracker::new(config.reputation_config().clone());
        let rules = RuleSet::from_config(config.as_ref());
        let cache = Arc::new(ResponseCache::new(config.cache_config()));
        let allowlist = config
            .allowlist_config()
            .map(|a| Allowlist::new(a, Arc::new(SystemResolver)));

        Self {
            config,
            limiter,
            reputation,
            rules,
            upstream,
            cache,
            allowlist,
            stats: Stats::new(),
            tasks,
        }
    }

    /// Replaces the allow-list resolver.
    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.allowlist = self
            .config
            .allowlist_config()
            .map(|a| Allowlist::new(a, resolver));
        self
    }

    /// Replaces the counter store behind the rate limiter.
    pub fn with_store(mut self, store: Arc<dyn CounterStore>) -> Self {
        self.limiter = RateLimiter::new(store);
        self
    }

    /// Replaces the abuse rules.
    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    pub fn config(&self) -> &Arc<C> {
        &self.config
    }

    pub fn reputation(&self) -> &ReputationTracker {
        &self.reputation
    }

    /// Tracker of the writes still running after their response was sent.
    pub fn tasks(&self) -> &BackgroundTasks {
        &self.tasks
    }

    /// Current counters and reputation figures.
    pub async fn stats(&self) -> StatsSnapshot {
        let mut snapshot = self.stats.snapshot();
        snapshot.tracked_clients = self.reputation.tracked_count().await;
        snapshot.blocked_clients = self.reputation.blocked_clients().await;
        snapshot
    }

    /// Handles one inbound request.
    ///
    /// The TCP peer address is read from the [`PeerAddr`] request extension
    /// when the listener provides it.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<GatewayBody>
    where
        B: Body<Data = Bytes> + Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        self.stats.record_request();
        let (parts, body) = req.into_parts();
        let peer = parts.extensions.get::<PeerAddr>().map(|p| p.0);
        let identity = identity::resolve(&parts.headers, peer, self.config.as_ref());

        let response = match self.process(&parts, body, &identity).await {
            Ok(response) => response,
            Err(err) => self.reject(&identity, err).await,
        };

        debug!(
            client = %identity,
            method = %parts.method,
            status = response.status().as_u16(),
            "Request handled"
        );
        response
    }

    async fn process<B>(
        &self,
        parts: &Parts,
        body: B,
        identity: &ClientIdentity,
    ) -> Result<Response<GatewayBody>>
    where
        B: Body<Data = Bytes> + Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let config = self.config.as_ref();
        let proxy = config.proxy_config();
        let path = parts.uri.path();
        let query = parts.uri.query();

        if let Some(declared) = declared_length(&parts.headers)
            && proxy.max_body_size > 0
            && declared > proxy.max_body_size
        {
            return Err(GatewayError::RequestTooLarge {
                size: declared,
                max: proxy.max_body_size,
            });
        }
        self.rules.check(path, &parts.headers)?;

        if self.reputation.get_reputation(identity).await.blocked {
            return Err(GatewayError::ClientBlocked(identity.to_string()));
        }
        if self.reputation.should_challenge(identity).await {
            let now = unix_secs();
            let settings = config.challenge_config();
            let passed = challenge::cookie_token(&parts.headers)
                .is_some_and(|token| challenge::verify_token(identity, token, now, settings));
            if !passed {
                info!(client = %identity, "Challenging suspicious client");
                self.stats.record_rejected();
                return Ok(response::with_cors(challenge::challenge_response(
                    identity, now, settings,
                )));
            }
        }

        self.limiter.check(identity, config).await?;

        if parts.method == Method::OPTIONS {
            return Ok(response::preflight());
        }

        if config.diagnostics_enabled()
            && let Some(response) = self.diagnostics(path, identity).await
        {
            return Ok(response);
        }

        if let Some(allowlist) = &self.allowlist {
            allowlist.check(identity).await?;
        }

        let credentials = config.credential_config();
        let admission = match auth::authenticate(path, query, &parts.headers, credentials) {
            Ok(admission) => admission,
            Err(err) if auth::should_prompt(&credentials.mode, &parts.method) => {
                self.penalize(identity, &err).await;
                return Ok(response::with_cors(auth::prompt_response(
                    &credentials.realm,
                )));
            }
            Err(err) => return Err(err),
        };

        let url = target::resolve(path, query, &credentials.mode)?;
        address_policy::check_target(&url)?;

        let body = read_body(body, proxy.max_body_size).await?;
        let request = TargetRequest::build(
            parts.method.clone(),
            url,
            &parts.headers,
            body,
            identity,
            &admission,
            config,
        );
        debug!(
            client = %identity,
            method = %request.method,
            target_host = request.url.host_str().unwrap_or_default(),
            "Forwarding request"
        );

        let shareable = parts.method == Method::GET
            && self.cache.is_enabled()
            && !request.carries_credentials();
        let cache_key = shareable.then(|| request.cache_key());
        if let Some(key) = &cache_key
            && let Some(hit) = self.cache.get(key).await
        {
            self.stats.record_cache_hit();
            return Ok(response::relay(hit, &parts.method, proxy));
        }

        let upstream = self.upstream.send(request).await?;
        self.stats.record_proxied();

        if let Some(key) = cache_key
            && cache::is_cacheable(&parts.method, &upstream)
        {
            let cache = Arc::clone(&self.cache);
            let stored = upstream.clone();
            self.tasks.spawn(async move {
                cache.insert(key, stored).await;
            });
        }

        Ok(response::relay(upstream, &parts.method, proxy))
    }

    /// Serves `/_debug_ip` and `/_stats`; `None` for any other path.
    async fn diagnostics(
        &self,
        path: &str,
        identity: &ClientIdentity,
    ) -> Option<Response<GatewayBody>> {
        match path {
            DEBUG_IP_PATH => {
                let body = match &self.allowlist {
                    Some(list) => {
                        let allowed = list.allowed_ip().await.ok();
                        json!({
                            "identity": identity.as_str(),
                            "allowlist_ip": allowed.map(|ip| ip.to_string()),
                            "matches": allowed.is_some_and(|ip| allowlist::matches(identity, ip)),
                        })
                    }
                    None => json!({
                        "identity": identity.as_str(),
                        "allowlist_ip": null,
                        "matches": true,
                    }),
                };
                Some(response::json_response(StatusCode::OK, &body))
            }
            STATS_PATH => {
                let snapshot = self.stats().await;
                let body = serde_json::to_value(&snapshot).unwrap_or_default();
                Some(response::json_response(StatusCode::OK, &body))
            }
            _ => None,
        }
    }

    /// Counts a rejection and records a violation when it affects reputation.
    async fn penalize(&self, identity: &ClientIdentity, err: &GatewayError) {
        self.stats.record_rejected();
        if err.is_server_error() {
            error!(client = %identity, error = %err, "Request failed");
        } else {
            warn!(client = %identity, error = %err, "Request rejected");
        }
        if err.affects_reputation() {
            self.reputation
                .record_violation(identity, &err.violation_reason())
                .await;
        }
    }

    async fn reject(&self, identity: &ClientIdentity, err: GatewayError) -> Response<GatewayBody> {
        self.penalize(identity, &err).await;
        response::error_response(&err)
    }
}

/// Declared `content-length`, if present and numeric.
fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(headers::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Reads the whole body, enforcing `max` bytes (0 = unlimited).
async fn read_body<B>(body: B, max: usize) -> Result<Bytes>
where
    B: Body<Data = Bytes> + Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let limit = if max == 0 { usize::MAX } else { max };
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => Err(GatewayError::RequestTooLarge {
            size: max.saturating_add(1),
            max,
        }),
        Err(e) => Err(GatewayError::BodyReadError(e.to_string())),
    }
}

fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}
