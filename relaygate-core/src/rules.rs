//! Abuse-detection rules.
//!
//! Rules are independent predicates over a [`RequestView`], evaluated in
//! order; the first one that matches names the rejection. The built-in set
//! covers path traversal, well-known scanner user agents and probing for
//! sensitive files. Deployments extend it with path substrings and
//! user-agent substrings from configuration.
//!
//! Paths are checked both as received and percent-decoded, so `%2e%2e/`
//! and `.ph%70` do not slip past a literal match.

use std::sync::LazyLock;

use hyper::HeaderMap;
use percent_encoding::percent_decode_str;
use regex::Regex;
use tracing::debug;

use crate::error::{GatewayError, Result};
use crate::headers;
use crate::types::FilteringProvider;

/// Scanner and attack-tool user agents refused by default.
pub const SCANNER_USER_AGENTS: &[&str] = &[
    "sqlmap",
    "nikto",
    "nmap",
    "masscan",
    "zgrab",
    "acunetix",
    "dirbuster",
];

static TRAVERSAL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(^|[/\\])\.\.([/\\]|$)").ok());

static SENSITIVE_FILE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)(/\.env($|[/.?])|/\.git(/|$)|wp-login\.php)").ok());

/// The parts of a request the rules inspect.
#[derive(Debug)]
pub struct RequestView<'a> {
    /// Path as received
    pub path: &'a str,
    /// Percent-decoded path
    pub decoded_path: String,
    /// `user-agent` header, if present and valid
    pub user_agent: Option<&'a str>,
}

impl<'a> RequestView<'a> {
    /// Builds a view over the request path and headers.
    pub fn new(path: &'a str, headers: &'a HeaderMap) -> Self {
        Self {
            path,
            decoded_path: url_decode(path),
            user_agent: headers
                .get(headers::USER_AGENT)
                .and_then(|v| v.to_str().ok()),
        }
    }

    fn paths(&self) -> [&str; 2] {
        [self.path, &self.decoded_path]
    }
}

/// One abuse predicate.
pub trait AbuseRule: Send + Sync {
    /// Name reported in logs and the reputation history.
    fn name(&self) -> &str;

    /// Returns true if the request should be rejected.
    fn matches(&self, request: &RequestView<'_>) -> bool;
}

/// `..` as a whole path segment.
pub struct PathTraversal;

impl AbuseRule for PathTraversal {
    fn name(&self) -> &str {
        "path_traversal"
    }

    fn matches(&self, request: &RequestView<'_>) -> bool {
        let Some(re) = TRAVERSAL.as_ref() else {
            return false;
        };
        request.paths().iter().any(|p| re.is_match(p))
    }
}

/// Known scanner user agents, case-insensitive.
pub struct ScannerUserAgent;

impl AbuseRule for ScannerUserAgent {
    fn name(&self) -> &str {
        "scanner_user_agent"
    }

    fn matches(&self, request: &RequestView<'_>) -> bool {
        request.user_agent.is_some_and(|ua| {
            let ua = ua.to_ascii_lowercase();
            SCANNER_USER_AGENTS.iter().any(|s| ua.contains(s))
        })
    }
}

/// Probing for `.env`, `.git` and WordPress login pages.
pub struct SensitiveFile;

impl AbuseRule for SensitiveFile {
    fn name(&self) -> &str {
        "sensitive_file"
    }

    fn matches(&self, request: &RequestView<'_>) -> bool {
        let Some(re) = SENSITIVE_FILE.as_ref() else {
            return false;
        };
        request.paths().iter().any(|p| re.is_match(p))
    }
}

/// Configured path substrings, case-sensitive.
pub struct PathPattern {
    patterns: Vec<String>,
}

impl PathPattern {
    pub fn new(patterns: Vec<String>) -> Self {
        Self { patterns }
    }
}

impl AbuseRule for PathPattern {
    fn name(&self) -> &str {
        "blocked_pattern"
    }

    fn matches(&self, request: &RequestView<'_>) -> bool {
        self.patterns
            .iter()
            .any(|pattern| request.paths().iter().any(|p| p.contains(pattern.as_str())))
    }
}

/// Configured user-agent substrings, case-insensitive.
pub struct UserAgentPattern {
    patterns: Vec<String>,
}

impl UserAgentPattern {
    pub fn new(patterns: Vec<String>) -> Self {
        Self {
            patterns: patterns.iter().map(|p| p.to_ascii_lowercase()).collect(),
        }
    }
}

impl AbuseRule for UserAgentPattern {
    fn name(&self) -> &str {
        "blocked_user_agent"
    }

    fn matches(&self, request: &RequestView<'_>) -> bool {
        request.user_agent.is_some_and(|ua| {
            let ua = ua.to_ascii_lowercase();
            self.patterns.iter().any(|p| ua.contains(p.as_str()))
        })
    }
}

/// Ordered rule list; first match wins.
pub struct RuleSet {
    rules: Vec<Box<dyn AbuseRule>>,
}

impl RuleSet {
    /// An empty set that matches nothing.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// The built-in rules.
    pub fn builtin() -> Self {
        Self::empty()
            .with(PathTraversal)
            .with(ScannerUserAgent)
            .with(SensitiveFile)
    }

    /// Built-in rules followed by the configured patterns.
    pub fn from_config(config: &impl FilteringProvider) -> Self {
        let mut set = Self::builtin();
        if !config.blocked_patterns().is_empty() {
            set = set.with(PathPattern::new(config.blocked_patterns().to_vec()));
        }
        if !config.blocked_user_agents().is_empty() {
            set = set.with(UserAgentPattern::new(config.blocked_user_agents().to_vec()));
        }
        set
    }

    /// Appends a rule.
    pub fn with(mut self, rule: impl AbuseRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true if there are no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Name of the first rule matching the request.
    pub fn evaluate(&self, request: &RequestView<'_>) -> Option<&str> {
        self.rules
            .iter()
            .find(|rule| rule.matches(request))
            .map(|rule| rule.name())
    }

    /// Rejects the request with [`GatewayError::SuspiciousPattern`] if a rule matches.
    pub fn check(&self, path: &str, headers: &HeaderMap) -> Result<()> {
        let view = RequestView::new(path, headers);
        match self.evaluate(&view) {
            Some(rule) => {
                debug!(rule, "Abuse rule matched");
                Err(GatewayError::SuspiciousPattern(rule.to_string()))
            }
            None => Ok(()),
        }
    }
}

/// Percent-decodes a path. Invalid escapes are kept as-is; invalid UTF-8
/// becomes U+FFFD.
pub fn url_decode(input: &str) -> String {
    percent_decode_str(input).decode_utf8_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestConfig;
    use hyper::header::HeaderValue;

    fn with_ua(ua: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("user-agent", HeaderValue::from_static(ua));
        headers
    }

    fn rule_for(set: &RuleSet, path: &str, headers: &HeaderMap) -> Option<String> {
        set.evaluate(&RequestView::new(path, headers)).map(String::from)
    }

    // ===========================================
    // url_decode tests
    // ===========================================

    #[test]
    fn test_url_decode_plain_and_simple() {
        assert_eq!(url_decode("/path/to/file"), "/path/to/file");
        assert_eq!(url_decode("hello%20world"), "hello world");
        assert_eq!(url_decode(""), "");
    }

    #[test]
    fn test_url_decode_bypass_attempts() {
        assert_eq!(url_decode(".ph%70"), ".php");
        assert_eq!(url_decode("%2e%65%6e%76"), ".env");
        assert_eq!(url_decode("%2F%2e%2e%2Fetc%2Fpasswd"), "/../etc/passwd");
    }

    #[test]
    fn test_url_decode_invalid_hex_preserved() {
        assert_eq!(url_decode("%GG"), "%GG");
        assert_eq!(url_decode("%"), "%");
        assert_eq!(url_decode("%2"), "%2");
    }

    #[test]
    fn test_url_decode_unicode() {
        assert_eq!(url_decode("caf%C3%A9"), "café");
        assert_eq!(url_decode("%FF.env"), "\u{FFFD}.env");
    }

    #[test]
    fn test_url_decode_keeps_plus() {
        assert_eq!(url_decode("a+b%2Bc"), "a+b+c");
    }

    // ===========================================
    // Built-in rules
    // ===========================================

    #[test]
    fn test_path_traversal() {
        let set = RuleSet::builtin();
        let none = HeaderMap::new();
        assert_eq!(
            rule_for(&set, "/KEY/example.com/../etc/passwd", &none).as_deref(),
            Some("path_traversal")
        );
        assert_eq!(
            rule_for(&set, "/KEY/example.com/%2e%2e/admin", &none).as_deref(),
            Some("path_traversal")
        );
        assert_eq!(
            rule_for(&set, "/KEY/example.com/a/..", &none).as_deref(),
            Some("path_traversal")
        );
    }

    #[test]
    fn test_dots_inside_names_are_fine() {
        let set = RuleSet::builtin();
        let none = HeaderMap::new();
        assert_eq!(rule_for(&set, "/KEY/example.com/v1..2/file", &none), None);
        assert_eq!(rule_for(&set, "/KEY/https://example.com/a.b/c", &none), None);
    }

    #[test]
    fn test_scanner_user_agents() {
        let set = RuleSet::builtin();
        for ua in ["sqlmap/1.7", "Mozilla/5.0 (compatible; Nmap Scripting Engine)", "zgrab/0.x"] {
            let headers = {
                let mut h = HeaderMap::new();
                h.insert("user-agent", HeaderValue::from_str(ua).unwrap());
                h
            };
            assert_eq!(
                rule_for(&set, "/KEY/example.com", &headers).as_deref(),
                Some("scanner_user_agent"),
                "{ua}"
            );
        }
        assert_eq!(rule_for(&set, "/KEY/example.com", &with_ua("curl/8.0")), None);
    }

    #[test]
    fn test_sensitive_files() {
        let set = RuleSet::builtin();
        let none = HeaderMap::new();
        for path in [
            "/KEY/example.com/.env",
            "/KEY/example.com/.env.local",
            "/KEY/example.com/.git/config",
            "/KEY/example.com/wp-login.php",
            "/KEY/example.com/%2eenv",
        ] {
            assert_eq!(
                rule_for(&set, path, &none).as_deref(),
                Some("sensitive_file"),
                "{path}"
            );
        }
        assert_eq!(rule_for(&set, "/KEY/example.com/.environment", &none), None);
        assert_eq!(rule_for(&set, "/KEY/example.com/.github/x", &none), None);
    }

    #[test]
    fn test_first_match_wins() {
        let set = RuleSet::builtin();
        let headers = with_ua("sqlmap");
        assert_eq!(
            rule_for(&set, "/KEY/example.com/../.env", &headers).as_deref(),
            Some("path_traversal")
        );
    }

    // ===========================================
    // Configured rules
    // ===========================================

    #[test]
    fn test_configured_path_patterns() {
        let config = TestConfig::new().with_blocked_patterns(vec![".php", "admin"]);
        let set = RuleSet::from_config(&config);
        let none = HeaderMap::new();

        assert_eq!(set.len(), 4);
        assert_eq!(
            rule_for(&set, "/KEY/example.com/index.ph%70", &none).as_deref(),
            Some("blocked_pattern")
        );
        assert_eq!(
            rule_for(&set, "/KEY/example.com/adm%69n", &none).as_deref(),
            Some("blocked_pattern")
        );
        assert_eq!(rule_for(&set, "/KEY/example.com/index.html", &none), None);
    }

    #[test]
    fn test_configured_path_patterns_case_sensitive() {
        let config = TestConfig::new().with_blocked_patterns(vec![".PHP"]);
        let set = RuleSet::from_config(&config);
        let none = HeaderMap::new();
        assert!(rule_for(&set, "/file.PHP", &none).is_some());
        assert!(rule_for(&set, "/file.php", &none).is_none());
    }

    #[test]
    fn test_configured_user_agents_case_insensitive() {
        let config = TestConfig::new().with_blocked_user_agents(vec!["BadBot"]);
        let set = RuleSet::from_config(&config);
        assert_eq!(
            rule_for(&set, "/", &with_ua("Mozilla/5.0 badbot/2.1")).as_deref(),
            Some("blocked_user_agent")
        );
    }

    #[test]
    fn test_check_maps_to_error() {
        let set = RuleSet::builtin();
        let err = set.check("/KEY/x/.git/HEAD", &HeaderMap::new()).unwrap_err();
        assert!(matches!(err, GatewayError::SuspiciousPattern(ref r) if r == "sensitive_file"));
        assert!(set.check("/KEY/example.com", &HeaderMap::new()).is_ok());
    }

    #[test]
    fn test_empty_set() {
        let set = RuleSet::empty();
        assert!(set.is_empty());
        assert!(set.check("/../.env", &with_ua("sqlmap")).is_ok());
    }

    #[test]
    fn test_custom_rule_pluggable() {
        struct LongPath;
        impl AbuseRule for LongPath {
            fn name(&self) -> &str {
                "long_path"
            }
            fn matches(&self, request: &RequestView<'_>) -> bool {
                request.path.len() > 20
            }
        }

        let set = RuleSet::empty().with(LongPath);
        assert_eq!(
            rule_for(&set, "/aaaaaaaaaaaaaaaaaaaaaaaa", &HeaderMap::new()).as_deref(),
            Some("long_path")
        );
    }
}
