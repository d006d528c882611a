//! Pipeline entry points.
//!
//! This module is the boundary between the host framework's pipeline and
//! the engine. It handles:
//! - Running the validator over a [`RequestView`]
//! - Applying recovered parameter/cookie values to the request
//! - Turning the structured result into a continue/reject decision
//!
//! # Design Principles
//!
//! 1. **The engine never picks the HTTP response**: the outcome says
//!    continue or reject; redirecting to a login/error page is the
//!    integration's call.
//! 2. **Explicit context**: no thread-locals, no ambient request state.
//!    The session travels inside the [`RequestView`]; everything else is
//!    passed as a value.
//! 3. **Bugs are not attacks**: internal faults surface as
//!    `INTERNAL_ERROR`, distinct from every tamper code.

use std::sync::Arc;

use crate::composer::PageComposer;
use crate::config::Config;
use crate::editable::{AcceptAllEditable, EditableRuleEvaluator};
use crate::error::{EngineError, ValidationError, ValidationErrorKind, ValidationResult};
use crate::store::SessionStore;
use crate::validator::Validator;

use super::adapter::{RequestView, ResponseOverlay};

/// The middleware's decision for one request.
#[derive(Debug)]
pub enum Outcome {
    /// Let the request continue to the next pipeline stage.
    ///
    /// The carried result may still contain editable errors (and, in debug
    /// mode, any errors at all) for the integration to report.
    Continue(ValidationResult),
    /// Divert the request; the result carries the typed errors.
    Reject(ValidationResult),
}

impl Outcome {
    /// Returns the validation result regardless of the decision.
    pub fn result(&self) -> &ValidationResult {
        match self {
            Self::Continue(result) | Self::Reject(result) => result,
        }
    }

    /// Returns `true` when the pipeline should continue.
    pub fn should_continue(&self) -> bool {
        matches!(self, Self::Continue(_))
    }
}

/// Request-integrity middleware: one per application, shared across
/// requests.
///
/// # Examples
///
/// ```
/// use integrity_core::web::{IntegrityMiddleware, RequestView};
/// use integrity_core::Config;
///
/// let middleware = IntegrityMiddleware::new(Config::new());
///
/// // Render a page, embedding the returned token in the markup.
/// let mut composer = middleware.composer("session-1");
/// let form = composer.begin_unit("/buy");
/// let rendered = composer.record_value(form, "qty", "2", false, "");
/// let token = composer.end_unit(form).unwrap();
/// composer.finish();
///
/// // Validate the submission that comes back.
/// let mut request = RequestView::new("session-1", "/buy");
/// request.add_parameter("_STATE_", token);
/// request.add_parameter("qty", rendered);
///
/// let outcome = middleware.process_request(&mut request);
/// assert!(outcome.should_continue());
/// assert_eq!(request.parameter_values("qty"), ["2"]);
/// ```
pub struct IntegrityMiddleware {
    config: Config,
    store: Arc<SessionStore>,
    evaluator: Arc<dyn EditableRuleEvaluator>,
}

impl IntegrityMiddleware {
    /// Creates the middleware with the stock accept-all editable evaluator.
    pub fn new(config: Config) -> Self {
        Self::with_evaluator(config, Arc::new(AcceptAllEditable))
    }

    /// Creates the middleware with an application-supplied editable-rule
    /// evaluator.
    pub fn with_evaluator(config: Config, evaluator: Arc<dyn EditableRuleEvaluator>) -> Self {
        let store = Arc::new(SessionStore::new(config.page_bound()));
        Self {
            config,
            store,
            evaluator,
        }
    }

    /// Returns the configuration the middleware runs with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the shared session store.
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Opens a composer for rendering a response in the given session.
    pub fn composer(&self, session_id: &str) -> PageComposer {
        PageComposer::open(&self.config, self.store.session(session_id))
    }

    /// Returns the response-side adapter for cookie capture in the given
    /// session.
    pub fn response_overlay(&self, session_id: &str) -> ResponseOverlay {
        ResponseOverlay::new(&self.config, self.store.session(session_id))
    }

    /// Validates one inbound request and decides whether the pipeline
    /// continues.
    ///
    /// On success the request view is updated in place: confidential
    /// parameter values are replaced by the recovered real values and
    /// cookie placeholders by the snapshotted values, so the next pipeline
    /// stage reads them as if submitted directly. In debug mode every
    /// check still runs and every error is reported, but the outcome is
    /// always `Continue`.
    pub fn process_request(&self, request: &mut RequestView) -> Outcome {
        let session = self.store.session(request.session_id());
        let validator = Validator::new(&self.config, self.evaluator.as_ref());

        let validation = validator.validate(
            &session,
            request.target(),
            request.submitted_parameters(),
            request.submitted_cookies(),
        );

        if validation.result.valid() {
            request.overlay_parameters(validation.recovered_parameters);
            request.overlay_cookies(validation.restored_cookies);
        }

        let editable_reject = self.config.rejects_on_editable_errors()
            && validation.result.editable_errors().next().is_some();
        let reject = !validation.result.valid() || editable_reject;

        if reject && self.config.debug_mode_enabled() {
            tracing::warn!(
                target = request.target(),
                errors = validation.result.errors().len(),
                "debug mode: request would have been rejected"
            );
            return Outcome::Continue(validation.result);
        }
        if reject {
            Outcome::Reject(validation.result)
        } else {
            Outcome::Continue(validation.result)
        }
    }

    /// Discards all engine state for a session (logout, expiry).
    pub fn end_session(&self, session_id: &str) {
        self.store.end_session(session_id);
    }

    /// Maps an internal fault to a rejection result with the
    /// `INTERNAL_ERROR` catalog code.
    ///
    /// Integrations call this when the write path fails (composer
    /// serialization/encryption), keeping real bugs distinct from tamper
    /// rejections in their error handling.
    pub fn internal_error(target: &str, error: &EngineError) -> ValidationResult {
        tracing::error!(target, %error, "internal engine fault");
        ValidationResult::rejected(vec![ValidationError::new(
            ValidationErrorKind::InternalError,
            target,
        )
        .with_submitted_value(error.to_string())])
    }
}

impl std::fmt::Debug for IntegrityMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrityMiddleware")
            .field("config", &self.config)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editable::RuleRegistry;

    fn compose_buy(middleware: &IntegrityMiddleware, session: &str) -> (String, String) {
        let mut composer = middleware.composer(session);
        let form = composer.begin_unit("/buy");
        let rendered = composer.record_value(form, "qty", "2", false, "");
        let token = composer.end_unit(form).unwrap();
        composer.finish();
        (token, rendered)
    }

    #[test]
    fn valid_submission_continues_with_recovered_values() {
        let middleware = IntegrityMiddleware::new(Config::new());
        let (token, rendered) = compose_buy(&middleware, "s-1");

        let mut request = RequestView::new("s-1", "/buy");
        request.add_parameter("_STATE_", token);
        request.add_parameter("qty", rendered);

        let outcome = middleware.process_request(&mut request);

        assert!(outcome.should_continue());
        assert_eq!(request.parameter_values("qty"), ["2"]);
    }

    #[test]
    fn tampered_submission_is_rejected() {
        let middleware = IntegrityMiddleware::new(Config::new());
        let (token, _) = compose_buy(&middleware, "s-1");

        let mut request = RequestView::new("s-1", "/buy");
        request.add_parameter("_STATE_", token);
        request.add_parameter("qty", "7");

        let outcome = middleware.process_request(&mut request);

        assert!(!outcome.should_continue());
        assert_eq!(
            outcome.result().errors()[0].kind(),
            ValidationErrorKind::InvalidConfidentialValue
        );
    }

    #[test]
    fn debug_mode_reports_but_never_rejects() {
        let middleware = IntegrityMiddleware::new(Config::new().debug_mode(true));
        let (token, _) = compose_buy(&middleware, "s-1");

        let mut request = RequestView::new("s-1", "/buy");
        request.add_parameter("_STATE_", token);
        request.add_parameter("qty", "7");

        let outcome = middleware.process_request(&mut request);

        assert!(outcome.should_continue());
        assert!(!outcome.result().valid());
        assert!(!outcome.result().errors().is_empty());
    }

    #[test]
    fn sessions_do_not_share_state() {
        let middleware = IntegrityMiddleware::new(Config::new());
        let (token, rendered) = compose_buy(&middleware, "s-1");

        // Replaying another session's token must fail.
        let mut request = RequestView::new("s-2", "/buy");
        request.add_parameter("_STATE_", token);
        request.add_parameter("qty", rendered);

        let outcome = middleware.process_request(&mut request);
        assert!(!outcome.should_continue());
    }

    #[test]
    fn editable_errors_reject_only_when_configured() {
        let registry = Arc::new(RuleRegistry::with_defaults());

        for (reject_configured, expect_continue) in [(false, true), (true, false)] {
            let middleware = IntegrityMiddleware::with_evaluator(
                Config::new().reject_on_editable_errors(reject_configured),
                Arc::clone(&registry) as Arc<dyn EditableRuleEvaluator>,
            );

            let mut composer = middleware.composer("s-1");
            let form = composer.begin_unit("/post");
            composer.record_value(form, "comment", "", true, "safe-text");
            let token = composer.end_unit(form).unwrap();
            composer.finish();

            let mut request = RequestView::new("s-1", "/post");
            request.add_parameter("_STATE_", token);
            request.add_parameter("comment", "<script>x</script>");

            let outcome = middleware.process_request(&mut request);
            assert_eq!(outcome.should_continue(), expect_continue);
            assert_eq!(outcome.result().editable_errors().count(), 1);
        }
    }

    #[test]
    fn internal_faults_map_to_the_internal_code() {
        let fault = EngineError::Misconfiguration("bad key".to_string());
        let result = IntegrityMiddleware::internal_error("/buy", &fault);

        assert!(!result.valid());
        assert_eq!(result.errors()[0].kind().code(), "INTERNAL_ERROR");
    }

    #[test]
    fn end_session_invalidates_outstanding_tokens() {
        let middleware = IntegrityMiddleware::new(Config::new());
        let (token, rendered) = compose_buy(&middleware, "s-1");

        middleware.end_session("s-1");

        let mut request = RequestView::new("s-1", "/buy");
        request.add_parameter("_STATE_", token);
        request.add_parameter("qty", rendered);

        let outcome = middleware.process_request(&mut request);
        assert!(!outcome.should_continue());
    }
}
