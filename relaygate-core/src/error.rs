//! Error types for RelayGate.
//!
//! Every request rejection the gateway can produce is a [`GatewayError`].
//! Errors are terminal for the current request: the pipeline renders them
//! into a JSON response and never retries on the caller's behalf.

use hyper::StatusCode;
use thiserror::Error;

/// Result type alias for RelayGate operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// The three independent rate-limit scopes, evaluated in declaration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RateLimitTier {
    /// Short window keyed by client identity.
    Burst,
    /// Long window keyed by client identity.
    PerClient,
    /// Long window shared by every client.
    Global,
}

impl RateLimitTier {
    /// All tiers in evaluation order.
    pub const ORDERED: [RateLimitTier; 3] = [Self::Burst, Self::PerClient, Self::Global];

    /// Stable lowercase name, used in counter keys and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Burst => "burst",
            Self::PerClient => "client",
            Self::Global => "global",
        }
    }
}

impl std::fmt::Display for RateLimitTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified error type for gateway operations.
///
/// # Example
///
/// ```
/// use relaygate_core::error::{GatewayError, Result};
///
/// fn require_target(raw: &str) -> Result<&str> {
///     if raw.is_empty() {
///         return Err(GatewayError::MissingTarget);
///     }
///     Ok(raw)
/// }
///
/// assert!(require_target("").is_err());
/// ```
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No destination URL could be extracted from the request.
    #[error("Missing target URL")]
    MissingTarget,

    /// The destination URL could not be parsed or uses an unsupported scheme.
    #[error("Invalid target URL: {0}")]
    InvalidTarget(String),

    /// The destination host is a private or local address.
    #[error("Private target blocked: {0}")]
    PrivateTargetBlocked(String),

    /// The caller did not present a valid credential.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// A rate-limit tier rejected the request.
    #[error("Rate limit exceeded ({tier} tier, window {window_secs}s)")]
    RateLimited {
        /// Tier that rejected the request.
        tier: RateLimitTier,
        /// Window length of that tier, reported as `retry-after`.
        window_secs: u64,
    },

    /// Request body larger than the configured maximum.
    #[error("Request body too large: {size} bytes (max: {max} bytes)")]
    RequestTooLarge {
        /// Declared or observed body size in bytes.
        size: usize,
        /// Maximum allowed size in bytes.
        max: usize,
    },

    /// An abuse-detection rule matched the request.
    #[error("Suspicious request pattern: {0}")]
    SuspiciousPattern(String),

    /// The client is currently blocked by its reputation record.
    #[error("Client blocked: {0}")]
    ClientBlocked(String),

    /// The upstream could not be reached or failed mid-response.
    #[error("Upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    /// The upstream did not answer within the configured timeout.
    #[error("Upstream timeout: {0}")]
    UpstreamTimeout(String),

    /// The upstream body exceeded the configured maximum.
    #[error("Upstream response too large (max: {max} bytes)")]
    UpstreamTooLarge {
        /// Maximum allowed size in bytes.
        max: usize,
    },

    /// The allow-list hostname could not be resolved and no previous value exists.
    #[error("Identity resolution failed: {0}")]
    IdentityResolutionFailed(String),

    /// Failed to read the inbound request body.
    #[error("Body read error: {0}")]
    BodyReadError(String),

    /// Configuration error (missing or invalid values).
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl GatewayError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingTarget => StatusCode::BAD_REQUEST,
            Self::InvalidTarget(_) => StatusCode::BAD_REQUEST,
            Self::PrivateTargetBlocked(_) => StatusCode::FORBIDDEN,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::RequestTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::SuspiciousPattern(_) => StatusCode::FORBIDDEN,
            Self::ClientBlocked(_) => StatusCode::FORBIDDEN,
            Self::UpstreamUnreachable(_) => StatusCode::BAD_GATEWAY,
            Self::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::UpstreamTooLarge { .. } => StatusCode::BAD_GATEWAY,
            Self::IdentityResolutionFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::BodyReadError(_) => StatusCode::BAD_REQUEST,
            Self::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a client-safe message for the JSON error body.
    ///
    /// Never includes the inner detail, which may carry upstream error text
    /// or internal addresses.
    pub fn user_message(&self) -> &str {
        match self {
            Self::MissingTarget => "Missing target URL",
            Self::InvalidTarget(_) => "Invalid target URL",
            Self::PrivateTargetBlocked(_) => "Access to private or local addresses is not allowed",
            Self::Unauthorized(_) => "Unauthorized",
            Self::RateLimited { .. } => "Rate limit exceeded",
            Self::RequestTooLarge { .. } => "Request body too large",
            Self::SuspiciousPattern(_) => "Request blocked",
            Self::ClientBlocked(_) => "Access denied",
            Self::UpstreamUnreachable(_) => "Error fetching target URL",
            Self::UpstreamTimeout(_) => "Upstream timeout",
            Self::UpstreamTooLarge { .. } => "Upstream response too large",
            Self::IdentityResolutionFailed(_) => "Service unavailable",
            Self::BodyReadError(_) => "Bad request",
            Self::ConfigError(_) => "Internal server error",
        }
    }

    /// Returns true if this error should be logged at error level.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigError(_)
                | Self::UpstreamUnreachable(_)
                | Self::UpstreamTimeout(_)
                | Self::UpstreamTooLarge { .. }
                | Self::IdentityResolutionFailed(_)
        )
    }

    /// Returns true if this rejection counts against the client's reputation.
    ///
    /// Environmental failures (upstream, DNS) never do.
    pub fn affects_reputation(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::SuspiciousPattern(_)
                | Self::PrivateTargetBlocked(_)
                | Self::Unauthorized(_)
        )
    }

    /// Short reason recorded in the reputation history.
    pub fn violation_reason(&self) -> String {
        match self {
            Self::RateLimited { tier, .. } => format!("rate_limited:{tier}"),
            Self::SuspiciousPattern(rule) => format!("suspicious:{rule}"),
            Self::PrivateTargetBlocked(_) => "private_target".to_string(),
            Self::Unauthorized(_) => "unauthorized".to_string(),
            other => other.status_code().as_u16().to_string(),
        }
    }
}
