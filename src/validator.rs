//! The read path: validating an inbound request against its recorded state.
//!
//! The algorithm is a straight-line state machine:
//!
//! ```text
//! START -> TOKEN_RESOLVED -> ACTION_CHECKED -> REQUIRED_CHECKED
//!       -> COOKIES_CHECKED -> PARAMS_CHECKED -> DONE(valid | invalid)
//! ```
//!
//! Any noneditable failure stops the machine and rejects the request.
//! Editable-rule failures are accumulated and reported without stopping;
//! the overall result can still be valid when only editable checks failed.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::codec::{codec_for, DecodeError, StateCodec};
use crate::config::Config;
use crate::confidential::{check_cookies, resolve_index};
use crate::editable::EditableRuleEvaluator;
use crate::error::{ValidationError, ValidationErrorKind, ValidationResult};
use crate::state::{State, StateParameter};
use crate::store::SessionState;
use crate::token::StateToken;

/// A submitted parameter: name plus every value received for it.
pub type SubmittedParameter = (String, Vec<String>);

/// The validator's full output.
///
/// Besides the [`ValidationResult`] this carries what downstream code needs
/// to continue the pipeline as if real values had been submitted directly:
/// parameter values recovered from confidential indices and cookie values
/// restored from session snapshots.
#[derive(Debug)]
pub struct Validation {
    /// Pass/fail plus the typed error list.
    pub result: ValidationResult,
    /// Real parameter values recovered by confidentiality mapping.
    pub recovered_parameters: Vec<SubmittedParameter>,
    /// Real cookie values restored from session snapshots.
    pub restored_cookies: Vec<(String, String)>,
}

impl Validation {
    fn skipped() -> Self {
        Self {
            result: ValidationResult::skipped(),
            recovered_parameters: Vec::new(),
            restored_cookies: Vec::new(),
        }
    }

    fn rejected(errors: Vec<ValidationError>) -> Self {
        Self {
            result: ValidationResult::rejected(errors),
            recovered_parameters: Vec::new(),
            restored_cookies: Vec::new(),
        }
    }
}

/// Validates inbound requests against the states recorded at composition
/// time.
///
/// The validator is pure with respect to everything except the session
/// state it is handed: it holds no state of its own and may be shared
/// freely across requests.
pub struct Validator<'a> {
    config: &'a Config,
    codec: Box<dyn StateCodec>,
    evaluator: &'a dyn EditableRuleEvaluator,
}

impl<'a> Validator<'a> {
    /// Creates a validator over the given configuration and editable-rule
    /// evaluator.
    pub fn new(config: &'a Config, evaluator: &'a dyn EditableRuleEvaluator) -> Self {
        Self {
            config,
            codec: codec_for(config),
            evaluator,
        }
    }

    /// Runs the validation state machine for one request.
    ///
    /// `parameters` are the submitted (name, values) pairs in submission
    /// order, query and form merged by the adapter; `cookies` the inbound
    /// cookie pairs. The session lock is held only while the token is
    /// resolved.
    pub fn validate(
        &self,
        session: &Arc<Mutex<SessionState>>,
        target: &str,
        parameters: &[SubmittedParameter],
        cookies: &[(String, String)],
    ) -> Validation {
        // START: requests with no prior state expected short-circuit.
        if self.config.is_start_page(target) || self.config.is_excluded_extension(target) {
            tracing::debug!(target, "start page or excluded extension, skipping");
            return Validation::skipped();
        }
        if parameters.is_empty() && !self.config.parameterless_urls_validated() {
            tracing::debug!(target, "parameterless url, skipping");
            return Validation::skipped();
        }

        // TOKEN_RESOLVED
        let state = match self.resolve_state(session, target, parameters) {
            Ok(state) => state,
            Err(error) => return self.reject(vec![error]),
        };

        // ACTION_CHECKED
        if !actions_match(state.action(), target) {
            return self.reject(vec![ValidationError::new(
                ValidationErrorKind::InvalidAction,
                target,
            )
            .with_submitted_value(target)
            .with_original_value(state.action())]);
        }

        // REQUIRED_CHECKED
        if let Some(error) = self.check_required(&state, target, parameters) {
            return self.reject(vec![error]);
        }

        // COOKIES_CHECKED: must run before any parameter check can
        // early-exit past a cookie failure.
        let restored_cookies = if self.config.cookie_integrity_enabled() {
            let check = check_cookies(self.config, &session.lock(), target, cookies);
            if !check.errors.is_empty() {
                return self.reject(check.errors);
            }
            check.restored
        } else {
            Vec::new()
        };

        // PARAMS_CHECKED
        let mut editable_errors = Vec::new();
        let mut recovered = Vec::new();
        for (name, values) in parameters {
            if self.config.is_exempt(target, name) {
                continue;
            }
            match self.check_parameter(&state, target, name, values, &mut editable_errors) {
                Ok(Some(real_values)) => recovered.push((name.clone(), real_values)),
                Ok(None) => {}
                Err(error) => {
                    editable_errors.push(error);
                    return self.reject(editable_errors);
                }
            }
        }

        // DONE(valid)
        tracing::debug!(
            target,
            editable_errors = editable_errors.len(),
            "request accepted"
        );
        Validation {
            result: ValidationResult::accepted(state, editable_errors),
            recovered_parameters: recovered,
            restored_cookies,
        }
    }

    /// Extracts and resolves the state token.
    fn resolve_state(
        &self,
        session: &Arc<Mutex<SessionState>>,
        target: &str,
        parameters: &[SubmittedParameter],
    ) -> Result<State, ValidationError> {
        let token_name = self.config.state_parameter_name();
        let raw = parameters
            .iter()
            .find(|(name, _)| name == token_name)
            .and_then(|(_, values)| values.first())
            .ok_or_else(|| {
                ValidationError::new(ValidationErrorKind::StateParameterMissing, target)
                    .with_parameter(token_name)
            })?;

        let token = StateToken::parse(raw).ok_or_else(|| {
            ValidationError::new(ValidationErrorKind::InvalidStateParameter, target)
                .with_parameter(token_name)
                .with_submitted_value(raw)
        })?;

        let mut guard = session.lock();
        self.codec.decode(&token, &mut guard).map_err(|e| {
            let kind = match e {
                DecodeError::UnknownPage => ValidationErrorKind::InvalidPageId,
                DecodeError::Tampered => ValidationErrorKind::InvalidStateParameter,
            };
            ValidationError::new(kind, target)
                .with_parameter(token_name)
                .with_submitted_value(raw)
        })
    }

    /// Verifies that every required parameter name was submitted.
    fn check_required(
        &self,
        state: &State,
        target: &str,
        parameters: &[SubmittedParameter],
    ) -> Option<ValidationError> {
        let required = state.required_parameter_names();
        if required.is_empty() {
            return None;
        }
        let mut seen = vec![false; required.len()];
        let mut remaining = required.len();
        for (name, _) in parameters {
            if let Some(i) = required.iter().position(|r| r == name) {
                if !seen[i] {
                    seen[i] = true;
                    remaining -= 1;
                    if remaining == 0 {
                        return None;
                    }
                }
            }
        }
        let missing: Vec<&str> = required
            .iter()
            .zip(&seen)
            .filter(|(_, seen)| !**seen)
            .map(|(name, _)| name.as_str())
            .collect();
        Some(
            ValidationError::new(ValidationErrorKind::RequiredParametersMissing, target)
                .with_parameter(missing.join(",")),
        )
    }

    /// Checks one submitted parameter against the state.
    ///
    /// Returns `Ok(Some(values))` when confidential indices were resolved
    /// to real values, `Ok(None)` when nothing needs substituting, and
    /// `Err` on the first blocking failure. Editable failures land in
    /// `editable_errors` and are not blocking.
    fn check_parameter(
        &self,
        state: &State,
        target: &str,
        name: &str,
        values: &[String],
        editable_errors: &mut Vec<ValidationError>,
    ) -> Result<Option<Vec<String>>, ValidationError> {
        let Some(parameter) = state.parameter(name) else {
            // Injected parameter: never recorded for this state.
            return Err(
                ValidationError::new(ValidationErrorKind::InvalidParameterName, target)
                    .with_parameter(name),
            );
        };

        match parameter {
            StateParameter::Editable { data_type } => {
                for violation in self.evaluator.validate(target, name, values, data_type) {
                    editable_errors.push(
                        ValidationError::new(ValidationErrorKind::InvalidEditableValue, target)
                            .with_parameter(name)
                            .with_submitted_value(violation.value)
                            .with_rule(violation.rule_name),
                    );
                }
                Ok(None)
            }
            StateParameter::Fixed { values: stored } => {
                if self.config.confidentiality_enabled() {
                    // A confidential submission picks indices: one value per
                    // choice, however many options were recorded.
                    return self.check_confidential(target, name, values, stored).map(Some);
                }
                let required = state.required_parameter_names().iter().any(|r| r == name);
                if required && values.len() != stored.len() {
                    return Err(ValidationError::new(
                        ValidationErrorKind::ParameterValuesIncomplete,
                        target,
                    )
                    .with_parameter(name));
                }
                self.check_plain(target, name, values, stored)?;
                Ok(None)
            }
        }
    }

    /// Confidential mode: every submitted value is an index into the stored
    /// list; repeats of the same index are rejected. Returns the recovered
    /// real values in submission order.
    fn check_confidential(
        &self,
        target: &str,
        name: &str,
        values: &[String],
        stored: &[String],
    ) -> Result<Vec<String>, ValidationError> {
        let mut used = vec![false; stored.len()];
        let mut recovered = Vec::with_capacity(values.len());
        for value in values {
            let Some((index, real)) = resolve_index(stored, value) else {
                return Err(ValidationError::new(
                    ValidationErrorKind::InvalidConfidentialValue,
                    target,
                )
                .with_parameter(name)
                .with_submitted_value(value));
            };
            if used[index] {
                return Err(ValidationError::new(
                    ValidationErrorKind::RepeatedParameterValues,
                    target,
                )
                .with_parameter(name)
                .with_submitted_value(value));
            }
            used[index] = true;
            recovered.push(real.to_string());
        }
        Ok(recovered)
    }

    /// Plain mode: every submitted value must match a distinct stored entry
    /// (case-insensitive, no repetition).
    fn check_plain(
        &self,
        target: &str,
        name: &str,
        values: &[String],
        stored: &[String],
    ) -> Result<(), ValidationError> {
        let mut used = vec![false; stored.len()];
        for value in values {
            let unused = (0..stored.len())
                .find(|&i| !used[i] && stored[i].eq_ignore_ascii_case(value));
            match unused {
                Some(i) => used[i] = true,
                None => {
                    let kind = if stored.iter().any(|s| s.eq_ignore_ascii_case(value)) {
                        ValidationErrorKind::RepeatedParameterValues
                    } else {
                        ValidationErrorKind::InvalidParameterValue
                    };
                    return Err(ValidationError::new(kind, target)
                        .with_parameter(name)
                        .with_submitted_value(value));
                }
            }
        }
        Ok(())
    }

    fn reject(&self, errors: Vec<ValidationError>) -> Validation {
        for error in &errors {
            tracing::warn!(
                code = error.kind().code(),
                target = error.target(),
                parameter = error.parameter_name().unwrap_or(""),
                "request rejected"
            );
        }
        Validation::rejected(errors)
    }
}

/// Case-insensitive action comparison tolerating one trailing slash.
fn actions_match(recorded: &str, submitted: &str) -> bool {
    let recorded = recorded.strip_suffix('/').unwrap_or(recorded);
    let submitted = submitted.strip_suffix('/').unwrap_or(submitted);
    recorded.eq_ignore_ascii_case(submitted)
}
