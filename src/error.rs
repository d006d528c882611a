use std::fmt;

use crate::state::State;

/// The kind of integrity violation detected while validating a request.
///
/// Each kind maps to a stable string code (see [`ValidationErrorKind::code`])
/// that callers use for i18n lookup and audit logging. The codes are part of
/// the external interface and never change between releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationErrorKind {
    /// The submitted target does not match the recorded action.
    InvalidAction,
    /// A submitted parameter name was never recorded for this state.
    InvalidParameterName,
    /// One or more required parameter names are absent from the request.
    RequiredParametersMissing,
    /// A submitted value matches none of the recorded values.
    InvalidParameterValue,
    /// The number of submitted values differs from the recorded count.
    ParameterValuesIncomplete,
    /// The same recorded value was submitted more than once.
    RepeatedParameterValues,
    /// A confidential index is not a number in `0..recorded_count`.
    InvalidConfidentialValue,
    /// The state token parameter is missing from the request.
    StateParameterMissing,
    /// The state token is present but cannot be resolved or verified.
    InvalidStateParameter,
    /// The page id portion of the token is malformed or unknown.
    InvalidPageId,
    /// An editable value was rejected by its validation rule.
    InvalidEditableValue,
    /// An inbound cookie has no matching snapshot in the session.
    InvalidCookie,
    /// A server-side fault occurred; not attributable to the client.
    InternalError,
}

impl ValidationErrorKind {
    /// Returns the stable catalog code for this kind.
    ///
    /// # Examples
    ///
    /// ```
    /// use integrity_core::ValidationErrorKind;
    ///
    /// assert_eq!(ValidationErrorKind::InvalidAction.code(), "INVALID_ACTION");
    /// assert_eq!(
    ///     ValidationErrorKind::StateParameterMissing.code(),
    ///     "HDIV_PARAMETER_DOES_NOT_EXIST"
    /// );
    /// ```
    pub fn code(self) -> &'static str {
        match self {
            Self::InvalidAction => "INVALID_ACTION",
            Self::InvalidParameterName => "INVALID_PARAMETER_NAME",
            Self::RequiredParametersMissing => "NOT_RECEIVED_ALL_REQUIRED_PARAMETERS",
            Self::InvalidParameterValue => "INVALID_PARAMETER_VALUE",
            Self::ParameterValuesIncomplete => "NOT_RECEIVED_ALL_PARAMETER_VALUES",
            Self::RepeatedParameterValues => "REPEATED_VALUES_FOR_PARAMETER",
            Self::InvalidConfidentialValue => "INVALID_CONFIDENTIAL_VALUE",
            Self::StateParameterMissing => "HDIV_PARAMETER_DOES_NOT_EXIST",
            Self::InvalidStateParameter => "INVALID_HDIV_PARAMETER_VALUE",
            Self::InvalidPageId => "INVALID_PAGE_ID",
            Self::InvalidEditableValue => "INVALID_EDITABLE_VALUE",
            Self::InvalidCookie => "INVALID_COOKIE",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Returns `true` for editable-content policy errors.
    ///
    /// Editable errors are accumulated during validation and do not abort
    /// the remaining checks; all other kinds do.
    pub fn is_editable(self) -> bool {
        matches!(self, Self::InvalidEditableValue)
    }

    /// Returns `true` for server-side faults that are not attributable to
    /// client tampering.
    pub fn is_internal(self) -> bool {
        matches!(self, Self::InternalError)
    }
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A single integrity violation detected while validating a request.
///
/// Violations are expected adversarial input: they are produced as plain
/// data, never propagated as faults. Only `kind` and `target` are always
/// present; the remaining fields are filled in when the violation concerns a
/// specific parameter or value.
///
/// # Examples
///
/// ```
/// use integrity_core::{ValidationError, ValidationErrorKind};
///
/// let error = ValidationError::new(ValidationErrorKind::InvalidParameterValue, "/buy")
///     .with_parameter("qty")
///     .with_submitted_value("99");
///
/// assert_eq!(error.kind(), ValidationErrorKind::InvalidParameterValue);
/// assert_eq!(error.parameter_name(), Some("qty"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    kind: ValidationErrorKind,
    target: String,
    parameter_name: Option<String>,
    submitted_value: Option<String>,
    original_value: Option<String>,
    validation_rule_name: Option<String>,
}

impl ValidationError {
    /// Creates a new validation error for the given target.
    pub fn new(kind: ValidationErrorKind, target: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            parameter_name: None,
            submitted_value: None,
            original_value: None,
            validation_rule_name: None,
        }
    }

    /// Attaches the offending parameter name.
    pub fn with_parameter(mut self, name: impl Into<String>) -> Self {
        self.parameter_name = Some(name.into());
        self
    }

    /// Attaches the value the client actually submitted.
    pub fn with_submitted_value(mut self, value: impl Into<String>) -> Self {
        self.submitted_value = Some(value.into());
        self
    }

    /// Attaches the value that was originally recorded server-side.
    pub fn with_original_value(mut self, value: impl Into<String>) -> Self {
        self.original_value = Some(value.into());
        self
    }

    /// Attaches the name of the editable rule that rejected the value.
    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.validation_rule_name = Some(rule.into());
        self
    }

    /// Returns the violation kind.
    pub fn kind(&self) -> ValidationErrorKind {
        self.kind
    }

    /// Returns the target the request was validated against.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Returns the offending parameter name, if any.
    pub fn parameter_name(&self) -> Option<&str> {
        self.parameter_name.as_deref()
    }

    /// Returns the submitted value, if recorded.
    pub fn submitted_value(&self) -> Option<&str> {
        self.submitted_value.as_deref()
    }

    /// Returns the originally recorded value, if recorded.
    pub fn original_value(&self) -> Option<&str> {
        self.original_value.as_deref()
    }

    /// Returns the editable rule name, if any.
    pub fn validation_rule_name(&self) -> Option<&str> {
        self.validation_rule_name.as_deref()
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at '{}'", self.kind, self.target)?;
        if let Some(name) = &self.parameter_name {
            write!(f, " parameter '{}'", name)?;
        }
        if let Some(value) = &self.submitted_value {
            write!(f, " value '{}'", value)?;
        }
        Ok(())
    }
}

/// The outcome of validating one inbound request.
///
/// A result is valid when no blocking error was detected. Editable-content
/// errors are carried in the same list but do not by themselves make the
/// result invalid; callers that want to reject on editable failures check
/// [`ValidationResult::editable_errors`] explicitly.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    valid: bool,
    errors: Vec<ValidationError>,
    restored_state: Option<State>,
}

impl ValidationResult {
    /// Creates a passing result carrying the resolved state.
    pub(crate) fn accepted(state: State, editable_errors: Vec<ValidationError>) -> Self {
        Self {
            valid: true,
            errors: editable_errors,
            restored_state: Some(state),
        }
    }

    /// Creates a failing result from the accumulated errors.
    pub(crate) fn rejected(errors: Vec<ValidationError>) -> Self {
        debug_assert!(!errors.is_empty());
        Self {
            valid: false,
            errors,
            restored_state: None,
        }
    }

    /// Creates a passing result for a request that required no validation
    /// (start page, excluded extension, parameterless URL).
    pub(crate) fn skipped() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            restored_state: None,
        }
    }

    /// Returns `true` when no blocking error was detected.
    pub fn valid(&self) -> bool {
        self.valid
    }

    /// Returns every error detected, blocking and editable alike.
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// Returns only the editable-content errors.
    pub fn editable_errors(&self) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter().filter(|e| e.kind().is_editable())
    }

    /// Returns the state the token resolved to, when validation got that far.
    pub fn restored_state(&self) -> Option<&State> {
        self.restored_state.as_ref()
    }
}

/// Server-side faults of the engine itself.
///
/// These are kept distinct from [`ValidationError`] so that callers never
/// treat a real bug or misconfiguration as client tampering. The middleware
/// edge maps them to the `INTERNAL_ERROR` catalog code.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Session key material could not be created or retrieved.
    #[error("session key unavailable: {0}")]
    KeyUnavailable(String),

    /// Serializing an outbound state failed on the write path.
    #[error("state serialization failed: {0}")]
    StateSerialization(String),

    /// Encryption of an outbound token failed.
    #[error("cipher failure: {0}")]
    CipherFailure(String),

    /// The engine was configured inconsistently.
    #[error("misconfiguration: {0}")]
    Misconfiguration(String),
}
