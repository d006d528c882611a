//! Editable-field rule delegation.
//!
//! Editable parameters have no recorded value set; their legality is decided
//! by a pluggable evaluator supplied by the embedding application. The
//! engine only defines the seam and ships a regex-based registry as the
//! default implementation.

use regex::Regex;

/// One editable value rejected by a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditableViolation {
    /// The submitted value that failed.
    pub value: String,
    /// Name of the rule that rejected it.
    pub rule_name: String,
}

/// The seam for editable-field validation.
///
/// Called once per editable parameter with every submitted value; returns
/// one violation per failing value. Violations are accumulated by the
/// validator and never abort the remaining checks.
pub trait EditableRuleEvaluator: Send + Sync {
    /// Validates the submitted values of one editable parameter.
    fn validate(
        &self,
        target: &str,
        parameter: &str,
        values: &[String],
        data_type: &str,
    ) -> Vec<EditableViolation>;
}

/// An evaluator that accepts every value (the default when the application
/// installs no rules).
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllEditable;

impl EditableRuleEvaluator for AcceptAllEditable {
    fn validate(&self, _: &str, _: &str, _: &[String], _: &str) -> Vec<EditableViolation> {
        Vec::new()
    }
}

/// An evaluator that rejects every value (for testing error paths).
#[derive(Debug, Clone, Copy)]
pub struct RejectAllEditable;

impl EditableRuleEvaluator for RejectAllEditable {
    fn validate(
        &self,
        _: &str,
        _: &str,
        values: &[String],
        _: &str,
    ) -> Vec<EditableViolation> {
        values
            .iter()
            .map(|v| EditableViolation {
                value: v.clone(),
                rule_name: "reject-all".to_string(),
            })
            .collect()
    }
}

/// Whether a pattern match means acceptance or rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RulePolarity {
    /// The value must match the pattern.
    Accept,
    /// The value must not match the pattern.
    Reject,
}

/// A named regex rule bound to a data type.
#[derive(Debug, Clone)]
struct EditableRule {
    name: String,
    data_type: String,
    pattern: Regex,
    polarity: RulePolarity,
}

impl EditableRule {
    fn rejects(&self, value: &str) -> bool {
        match self.polarity {
            RulePolarity::Accept => !self.pattern.is_match(value),
            RulePolarity::Reject => self.pattern.is_match(value),
        }
    }
}

/// Regex-based rule registry, the stock [`EditableRuleEvaluator`].
///
/// Rules are keyed by the data-type name recorded with the editable
/// parameter; a parameter whose data type has no registered rule is
/// accepted. [`RuleRegistry::with_defaults`] ships a `safe-text` rule
/// rejecting script injection.
///
/// # Examples
///
/// ```
/// use integrity_core::{EditableRuleEvaluator, RuleRegistry, RulePolarity};
///
/// let registry = RuleRegistry::new()
///     .rule("digits-only", "number", r"^[0-9]+$", RulePolarity::Accept);
///
/// let violations = registry.validate("/buy", "qty", &["12a".to_string()], "number");
/// assert_eq!(violations.len(), 1);
/// assert_eq!(violations[0].rule_name, "digits-only");
/// ```
#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    rules: Vec<EditableRule>,
}

impl RuleRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the stock rules: `safe-text` rejecting
    /// `<script` (case-insensitive) for the `safe-text` data type.
    pub fn with_defaults() -> Self {
        Self::new().rule("safe-text", "safe-text", r"(?i)<\s*script", RulePolarity::Reject)
    }

    /// Registers a rule for a data type.
    ///
    /// # Panics
    ///
    /// Panics on an invalid regex; rules are fixed at startup, so this is a
    /// programming error.
    pub fn rule(
        mut self,
        name: impl Into<String>,
        data_type: impl Into<String>,
        pattern: &str,
        polarity: RulePolarity,
    ) -> Self {
        let regex = Regex::new(pattern)
            .unwrap_or_else(|e| panic!("invalid editable rule pattern '{}': {}", pattern, e));
        self.rules.push(EditableRule {
            name: name.into(),
            data_type: data_type.into(),
            pattern: regex,
            polarity,
        });
        self
    }
}

impl EditableRuleEvaluator for RuleRegistry {
    fn validate(
        &self,
        _target: &str,
        _parameter: &str,
        values: &[String],
        data_type: &str,
    ) -> Vec<EditableViolation> {
        let mut violations = Vec::new();
        for rule in self.rules.iter().filter(|r| r.data_type == data_type) {
            for value in values {
                if rule.rejects(value) {
                    violations.push(EditableViolation {
                        value: value.clone(),
                        rule_name: rule.name.clone(),
                    });
                }
            }
        }
        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_data_types_are_accepted() {
        let registry = RuleRegistry::new();
        let violations =
            registry.validate("/post", "comment", &["anything".to_string()], "free-text");
        assert!(violations.is_empty());
    }

    #[test]
    fn default_rule_rejects_script_tags() {
        let registry = RuleRegistry::with_defaults();
        let violations = registry.validate(
            "/post",
            "comment",
            &["<script>x</script>".to_string(), "hello".to_string()],
            "safe-text",
        );

        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].value, "<script>x</script>");
        assert_eq!(violations[0].rule_name, "safe-text");
    }

    #[test]
    fn default_rule_is_case_insensitive_and_space_tolerant() {
        let registry = RuleRegistry::with_defaults();
        for payload in ["<SCRIPT>", "< script>", "<ScRiPt src=x>"] {
            let violations =
                registry.validate("/post", "comment", &[payload.to_string()], "safe-text");
            assert_eq!(violations.len(), 1, "missed {:?}", payload);
        }
    }

    #[test]
    fn accept_polarity_requires_a_match() {
        let registry =
            RuleRegistry::new().rule("digits", "number", r"^[0-9]+$", RulePolarity::Accept);

        assert!(registry
            .validate("/t", "qty", &["123".to_string()], "number")
            .is_empty());
        assert_eq!(
            registry
                .validate("/t", "qty", &["12a".to_string()], "number")
                .len(),
            1
        );
    }

    #[test]
    fn each_failing_value_reports_separately() {
        let violations = RejectAllEditable.validate(
            "/t",
            "comment",
            &["a".to_string(), "b".to_string()],
            "any",
        );
        assert_eq!(violations.len(), 2);
    }
}
