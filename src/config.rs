//! Engine configuration.
//!
//! The configuration surface is consumed, not owned, by the engine: the
//! embedding application builds a [`Config`] once at startup and shares it
//! across requests. Builder methods chain, matching the write-once usage.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use regex::Regex;

/// Token encoding strategy.
///
/// All three strategies share one codec contract and are interchangeable by
/// configuration; see the crate docs for the trade-offs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Token references server-side memory; cheapest, requires the session
    /// store to hold every open page.
    #[default]
    Reference,
    /// Token carries the encrypted state; self-contained but larger.
    Cipher,
    /// Token carries the state in the clear plus a keyed digest; values are
    /// visible to the client.
    Hash,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reference => f.write_str("reference"),
            Self::Cipher => f.write_str("cipher"),
            Self::Hash => f.write_str("hash"),
        }
    }
}

/// Error returned when a strategy name is unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStrategyError(String);

impl fmt::Display for ParseStrategyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown strategy '{}'", self.0)
    }
}

impl std::error::Error for ParseStrategyError {}

impl FromStr for Strategy {
    type Err = ParseStrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reference" => Ok(Self::Reference),
            "cipher" => Ok(Self::Cipher),
            "hash" => Ok(Self::Hash),
            other => Err(ParseStrategyError(other.to_string())),
        }
    }
}

/// Whether composing reopens the current page or starts a fresh one.
///
/// The underlying question (one page per rendered document, or one page
/// reused across partial updates of the same visual page) is a deployment
/// decision, so it is an explicit policy rather than a hard-coded rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PagePolicy {
    /// Every full render opens a new page with a fresh anti-replay nonce.
    #[default]
    FreshPerDocument,
    /// Partial updates keep composing onto the current page, preserving its
    /// nonce and previously issued tokens.
    ReuseCurrent,
}

/// Predicate deciding whether a (target, parameter) pair skips validation.
pub type ExemptPredicate = Arc<dyn Fn(&str, &str) -> bool + Send + Sync>;

/// Engine configuration shared across all requests.
///
/// # Examples
///
/// ```
/// use integrity_core::{Config, Strategy};
///
/// let config = Config::new()
///     .strategy(Strategy::Cipher)
///     .confidentiality(true)
///     .max_pages_per_session(10)
///     .start_page("^/login$")
///     .exempt_parameter("locale");
///
/// assert!(config.is_start_page("/login"));
/// assert!(config.is_exempt("/any", "locale"));
/// ```
#[derive(Clone)]
pub struct Config {
    strategy: Strategy,
    confidentiality: bool,
    cookie_confidentiality: bool,
    cookie_integrity: bool,
    max_pages_per_session: usize,
    page_policy: PagePolicy,
    start_page_patterns: Vec<Regex>,
    excluded_extensions: Vec<String>,
    validate_parameterless_urls: bool,
    state_parameter: String,
    session_cookie_name: String,
    exempt_parameters: Vec<String>,
    exempt_predicate: Option<ExemptPredicate>,
    debug_mode: bool,
    compress_state: bool,
    reject_on_editable_errors: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            confidentiality: true,
            cookie_confidentiality: false,
            cookie_integrity: false,
            max_pages_per_session: 5,
            page_policy: PagePolicy::default(),
            start_page_patterns: Vec::new(),
            excluded_extensions: ["css", "js", "png", "gif", "jpg", "ico", "svg", "woff2"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            validate_parameterless_urls: false,
            state_parameter: "_STATE_".to_string(),
            session_cookie_name: "SESSIONID".to_string(),
            exempt_parameters: Vec::new(),
            exempt_predicate: None,
            debug_mode: false,
            compress_state: true,
            reject_on_editable_errors: false,
        }
    }
}

impl Config {
    /// Creates a configuration with defaults: reference strategy,
    /// confidentiality on, five pages per session, common static-asset
    /// extensions excluded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects the token encoding strategy.
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Enables or disables confidentiality (index substitution) for
    /// parameter values.
    pub fn confidentiality(mut self, enabled: bool) -> Self {
        self.confidentiality = enabled;
        self
    }

    /// Enables or disables cookie-value confidentiality.
    ///
    /// Implies cookie integrity: placeholders can only be restored when
    /// inbound cookies are checked against the session snapshots.
    pub fn cookie_confidentiality(mut self, enabled: bool) -> Self {
        self.cookie_confidentiality = enabled;
        if enabled {
            self.cookie_integrity = true;
        }
        self
    }

    /// Enables or disables inbound cookie-integrity validation.
    pub fn cookie_integrity(mut self, enabled: bool) -> Self {
        self.cookie_integrity = enabled;
        self
    }

    /// Sets the LRU bound on pages kept per session.
    pub fn max_pages_per_session(mut self, bound: usize) -> Self {
        self.max_pages_per_session = bound.max(1);
        self
    }

    /// Sets the page composition policy.
    pub fn page_policy(mut self, policy: PagePolicy) -> Self {
        self.page_policy = policy;
        self
    }

    /// Adds a start-page pattern (anchored regex over the target).
    ///
    /// Requests matching a start page carry no prior state and skip
    /// validation entirely.
    ///
    /// # Panics
    ///
    /// Panics if the pattern is not a valid regex. Start pages are fixed at
    /// startup, so an invalid pattern is a programming error.
    pub fn start_page(mut self, pattern: &str) -> Self {
        let regex = Regex::new(pattern)
            .unwrap_or_else(|e| panic!("invalid start page pattern '{}': {}", pattern, e));
        self.start_page_patterns.push(regex);
        self
    }

    /// Replaces the excluded-extension list.
    pub fn excluded_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Enables validation of URLs that carry no parameters at all.
    pub fn validate_parameterless_urls(mut self, enabled: bool) -> Self {
        self.validate_parameterless_urls = enabled;
        self
    }

    /// Renames the token parameter embedded in markup.
    pub fn state_parameter(mut self, name: impl Into<String>) -> Self {
        self.state_parameter = name.into();
        self
    }

    /// Sets the host framework's session cookie name, always exempt from
    /// cookie-integrity checks.
    pub fn session_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.session_cookie_name = name.into();
        self
    }

    /// Exempts a parameter name from validation on every target.
    pub fn exempt_parameter(mut self, name: impl Into<String>) -> Self {
        self.exempt_parameters.push(name.into());
        self
    }

    /// Installs a predicate for per-(target, parameter) exemptions.
    pub fn exempt_predicate(
        mut self,
        predicate: impl Fn(&str, &str) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.exempt_predicate = Some(Arc::new(predicate));
        self
    }

    /// Enables debug mode: every check still runs and every error is still
    /// reported, but the middleware never rejects.
    pub fn debug_mode(mut self, enabled: bool) -> Self {
        self.debug_mode = enabled;
        self
    }

    /// Enables or disables deflate compression of cipher-strategy payloads.
    pub fn compress_state(mut self, enabled: bool) -> Self {
        self.compress_state = enabled;
        self
    }

    /// Makes editable-rule failures reject the request at the middleware
    /// edge instead of only being reported.
    pub fn reject_on_editable_errors(mut self, enabled: bool) -> Self {
        self.reject_on_editable_errors = enabled;
        self
    }

    // ========================================================================
    // Read surface
    // ========================================================================

    /// Returns the configured strategy.
    pub fn strategy_kind(&self) -> Strategy {
        self.strategy
    }

    /// Returns whether parameter confidentiality is enabled.
    pub fn confidentiality_enabled(&self) -> bool {
        self.confidentiality
    }

    /// Returns whether cookie confidentiality is enabled.
    pub fn cookie_confidentiality_enabled(&self) -> bool {
        self.cookie_confidentiality
    }

    /// Returns whether cookie integrity is enabled.
    pub fn cookie_integrity_enabled(&self) -> bool {
        self.cookie_integrity
    }

    /// Returns the LRU page bound.
    pub fn page_bound(&self) -> usize {
        self.max_pages_per_session
    }

    /// Returns the page composition policy.
    pub fn page_policy_kind(&self) -> PagePolicy {
        self.page_policy
    }

    /// Returns whether parameterless URLs are validated.
    pub fn parameterless_urls_validated(&self) -> bool {
        self.validate_parameterless_urls
    }

    /// Returns the token parameter name.
    pub fn state_parameter_name(&self) -> &str {
        &self.state_parameter
    }

    /// Returns the host session cookie name.
    pub fn session_cookie(&self) -> &str {
        &self.session_cookie_name
    }

    /// Returns whether debug mode is on.
    pub fn debug_mode_enabled(&self) -> bool {
        self.debug_mode
    }

    /// Returns whether cipher payloads are compressed.
    pub fn compression_enabled(&self) -> bool {
        self.compress_state
    }

    /// Returns whether editable failures reject at the middleware edge.
    pub fn rejects_on_editable_errors(&self) -> bool {
        self.reject_on_editable_errors
    }

    /// Returns `true` when the target matches a configured start page.
    pub fn is_start_page(&self, target: &str) -> bool {
        self.start_page_patterns.iter().any(|p| p.is_match(target))
    }

    /// Returns `true` when the target's file extension is excluded.
    pub fn is_excluded_extension(&self, target: &str) -> bool {
        let path = target.split(['?', '#']).next().unwrap_or(target);
        match path.rsplit_once('.') {
            Some((_, ext)) => self
                .excluded_extensions
                .iter()
                .any(|e| e.eq_ignore_ascii_case(ext)),
            None => false,
        }
    }

    /// Returns `true` when the parameter skips validation on this target.
    ///
    /// The token parameter itself is always exempt.
    pub fn is_exempt(&self, target: &str, parameter: &str) -> bool {
        if parameter == self.state_parameter {
            return true;
        }
        if self.exempt_parameters.iter().any(|n| n == parameter) {
            return true;
        }
        match &self.exempt_predicate {
            Some(predicate) => predicate(target, parameter),
            None => false,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("strategy", &self.strategy)
            .field("confidentiality", &self.confidentiality)
            .field("cookie_confidentiality", &self.cookie_confidentiality)
            .field("cookie_integrity", &self.cookie_integrity)
            .field("max_pages_per_session", &self.max_pages_per_session)
            .field("page_policy", &self.page_policy)
            .field("start_page_patterns", &self.start_page_patterns.len())
            .field("excluded_extensions", &self.excluded_extensions)
            .field("state_parameter", &self.state_parameter)
            .field("debug_mode", &self.debug_mode)
            .finish_non_exhaustive()
    }
}
