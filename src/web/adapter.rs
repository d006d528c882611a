//! Request/response adapters for mapping host-framework types to the
//! engine's narrow surface.
//!
//! Instead of decorating or subclassing the host framework's request type,
//! the integration builds a [`RequestView`]: owned copies of the inputs the
//! validator needs plus an overlay for the values the engine recovers.
//! Framework-specific code implements `From<FrameworkRequest>` for it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::Config;
use crate::confidential::{capture_cookie, SavedCookie};
use crate::store::SessionState;
use crate::validator::SubmittedParameter;

/// Framework-agnostic view of one inbound request.
///
/// Holds the target, the submitted parameters (query and form merged, in
/// submission order) and the inbound cookies, all as simple owned data. The
/// overlay carries values the engine recovered (confidential parameters,
/// restored cookies); reads consult the overlay first, so downstream code
/// sees real values as if the client had submitted them directly.
///
/// # Examples
///
/// ```
/// use integrity_core::web::RequestView;
///
/// let mut request = RequestView::new("session-1", "/buy");
/// request.add_parameter("qty", "1");
/// request.add_cookie("pref", "0");
///
/// assert_eq!(request.parameter_values("qty"), ["1"]);
/// ```
#[derive(Debug, Clone)]
pub struct RequestView {
    session_id: String,
    target: String,
    parameters: Vec<SubmittedParameter>,
    cookies: Vec<(String, String)>,
    parameter_overlay: HashMap<String, Vec<String>>,
    cookie_overlay: HashMap<String, String>,
}

impl RequestView {
    /// Creates an empty view for the given session and target.
    pub fn new(session_id: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            target: target.into(),
            parameters: Vec::new(),
            cookies: Vec::new(),
            parameter_overlay: HashMap::new(),
            cookie_overlay: HashMap::new(),
        }
    }

    /// Appends a submitted parameter value, preserving submission order.
    pub fn add_parameter(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        match self.parameters.iter_mut().find(|(n, _)| *n == name) {
            Some((_, values)) => values.push(value.into()),
            None => self.parameters.push((name, vec![value.into()])),
        }
    }

    /// Appends an inbound cookie.
    pub fn add_cookie(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.cookies.push((name.into(), value.into()));
    }

    /// Returns the session id this request belongs to.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Returns the request target.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Returns the submitted parameters as the validator sees them (no
    /// overlay applied).
    pub fn submitted_parameters(&self) -> &[SubmittedParameter] {
        &self.parameters
    }

    /// Returns the inbound cookies as submitted.
    pub fn submitted_cookies(&self) -> &[(String, String)] {
        &self.cookies
    }

    /// Returns the effective values of a parameter, overlay first.
    pub fn parameter_values(&self, name: &str) -> &[String] {
        if let Some(values) = self.parameter_overlay.get(name) {
            return values;
        }
        self.parameters
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
            .unwrap_or(&[])
    }

    /// Returns the effective value of a cookie, overlay first.
    pub fn cookie_value(&self, name: &str) -> Option<&str> {
        if let Some(value) = self.cookie_overlay.get(name) {
            return Some(value);
        }
        self.cookies
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Installs recovered parameter values over the submitted ones.
    pub(crate) fn overlay_parameters(&mut self, recovered: Vec<SubmittedParameter>) {
        for (name, values) in recovered {
            self.parameter_overlay.insert(name, values);
        }
    }

    /// Installs restored cookie values over the submitted placeholders.
    pub(crate) fn overlay_cookies(&mut self, restored: Vec<(String, String)>) {
        for (name, value) in restored {
            self.cookie_overlay.insert(name, value);
        }
    }
}

/// Write-side adapter: captures application-set cookies into the session
/// and produces the values to place on outbound headers.
///
/// The host framework's response object is not wrapped; this overlay only
/// owns the engine's part of the response (cookie substitution) and leaves
/// header mutation to the integration via the returned values.
pub struct ResponseOverlay {
    config: Config,
    session: Arc<Mutex<SessionState>>,
}

impl ResponseOverlay {
    /// Creates an overlay bound to one session.
    pub fn new(config: &Config, session: Arc<Mutex<SessionState>>) -> Self {
        Self {
            config: config.clone(),
            session,
        }
    }

    /// Captures a cookie the application is setting and returns the value
    /// the framework must actually send.
    ///
    /// With cookie confidentiality enabled the returned value is the fixed
    /// placeholder; the real value stays in the session snapshot.
    pub fn set_cookie(&self, cookie: SavedCookie) -> String {
        capture_cookie(&self.config, &mut self.session.lock(), cookie)
    }

    /// Clears every pending cookie snapshot (response reset).
    pub fn reset(&self) {
        self.session.lock().clear_cookies();
    }
}

impl std::fmt::Debug for ResponseOverlay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseOverlay").finish_non_exhaustive()
    }
}
