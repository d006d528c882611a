//! Confidentiality mapping for parameter values and cookies.
//!
//! Parameter confidentiality transmits positional indices instead of real
//! values; the reverse lookup happens during validation. Cookie
//! confidentiality snapshots the real cookie server-side, sends a fixed
//! placeholder to the client, and restores the real value on the next
//! request after checking the inbound cookie against the session snapshots.

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{ValidationError, ValidationErrorKind};
use crate::store::SessionState;

/// Outbound value sent in place of every confidential cookie.
pub const COOKIE_PLACEHOLDER: &str = "0";

/// Renders the outbound form of a recorded parameter value.
///
/// In confidential mode the client only ever sees the position of the value
/// in the recorded list; otherwise the real value passes through.
pub(crate) fn outbound_value(confidential: bool, position: usize, value: &str) -> String {
    if confidential {
        position.to_string()
    } else {
        value.to_string()
    }
}

/// Resolves a submitted confidential index against the recorded values.
///
/// Accepts exactly the decimal indices `0..values.len()`; anything else
/// (sign, whitespace, overflow, `index == len`) is rejected. Returns the
/// position and the recovered real value.
pub(crate) fn resolve_index<'a>(
    values: &'a [String],
    submitted: &str,
) -> Option<(usize, &'a str)> {
    if submitted.is_empty() || !submitted.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let index = submitted.parse::<usize>().ok()?;
    values.get(index).map(|v| (index, v.as_str()))
}

/// Immutable snapshot of a cookie at the moment the application set it.
///
/// Snapshots live in the session keyed by name, are replaced whenever a
/// same-named cookie is set again, and serve two purposes: restoring real
/// values hidden by confidentiality, and validating inbound cookies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedCookie {
    name: String,
    value: String,
    domain: Option<String>,
    path: Option<String>,
    max_age: Option<i64>,
    secure: bool,
    version: u8,
}

impl SavedCookie {
    /// Snapshots a cookie by name and value with default attributes.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: None,
            max_age: None,
            secure: false,
            version: 0,
        }
    }

    /// Sets the domain attribute.
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Sets the path attribute.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets the max-age attribute in seconds.
    pub fn max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    /// Sets the secure attribute.
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Sets the cookie version.
    pub fn version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    /// Returns the cookie name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the real (server-side) value.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns the domain attribute, if set.
    pub fn domain_attr(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    /// Returns the path attribute, if set.
    pub fn path_attr(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Returns the max-age attribute, if set.
    pub fn max_age_attr(&self) -> Option<i64> {
        self.max_age
    }

    /// Returns the secure attribute.
    pub fn is_secure(&self) -> bool {
        self.secure
    }
}

/// Captures an application-set cookie into the session and returns the
/// value to place on the outbound header.
///
/// With cookie confidentiality enabled the client receives the fixed
/// placeholder; otherwise the real value passes through unchanged. Either
/// way the snapshot is stored for inbound validation.
pub fn capture_cookie(config: &Config, session: &mut SessionState, cookie: SavedCookie) -> String {
    let outbound = if config.cookie_confidentiality_enabled() {
        COOKIE_PLACEHOLDER.to_string()
    } else {
        cookie.value().to_string()
    };
    session.save_cookie(cookie);
    outbound
}

/// The result of validating the inbound cookie set.
#[derive(Debug, Default)]
pub struct CookieCheck {
    /// Integrity violations, one per offending cookie.
    pub errors: Vec<ValidationError>,
    /// Real values to substitute into the request before the next pipeline
    /// stage, as `(name, value)` pairs.
    pub restored: Vec<(String, String)>,
}

/// Validates inbound cookies against the session snapshots.
///
/// Every inbound cookie name must be known to the session; the host
/// framework's session cookie is always exempt. In confidential mode the
/// inbound value must be the placeholder and the real value is restored; in
/// plain integrity mode the inbound value must equal the snapshot.
pub fn check_cookies(
    config: &Config,
    session: &SessionState,
    target: &str,
    inbound: &[(String, String)],
) -> CookieCheck {
    let mut check = CookieCheck::default();
    for (name, value) in inbound {
        if name == config.session_cookie() {
            continue;
        }
        let Some(saved) = session.saved_cookie(name) else {
            check.errors.push(
                ValidationError::new(ValidationErrorKind::InvalidCookie, target)
                    .with_parameter(name.clone())
                    .with_submitted_value(value.clone()),
            );
            continue;
        };
        if config.cookie_confidentiality_enabled() {
            if value != COOKIE_PLACEHOLDER {
                check.errors.push(
                    ValidationError::new(ValidationErrorKind::InvalidCookie, target)
                        .with_parameter(name.clone())
                        .with_submitted_value(value.clone()),
                );
                continue;
            }
            check
                .restored
                .push((name.clone(), saved.value().to_string()));
        } else if value != saved.value() {
            check.errors.push(
                ValidationError::new(ValidationErrorKind::InvalidCookie, target)
                    .with_parameter(name.clone())
                    .with_submitted_value(value.clone())
                    .with_original_value(saved.value()),
            );
        }
    }
    check
}
