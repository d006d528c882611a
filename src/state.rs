//! Page and state records written at composition time.
//!
//! A [`Page`] is created once per rendering pass and owns one [`State`] per
//! distinct link or form recorded on it. Both are write-once: the composer
//! fills them, the validator only reads them. Eviction happens at page
//! granularity in the session store.

use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Identifier of a [`Page`] within one session.
///
/// Two textual forms exist and must round-trip exactly through
/// `Display`/`FromStr`:
/// - `Seq`: a decimal sequence number (`"17"`)
/// - `Unique`: a 128-bit id rendered as `"U"` plus 32 lowercase hex digits
///
/// # Examples
///
/// ```
/// use integrity_core::PageId;
///
/// let seq: PageId = "17".parse().unwrap();
/// assert_eq!(seq.to_string(), "17");
///
/// let unique: PageId = "U00000000000000000000000000000abc".parse().unwrap();
/// assert_eq!(unique.to_string(), "U00000000000000000000000000000abc");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PageId {
    /// Sequential page number within the session.
    Seq(u64),
    /// Random 128-bit page id.
    Unique(u128),
}

impl PageId {
    /// Generates a random 128-bit page id.
    pub fn random() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::Unique(u128::from_be_bytes(bytes))
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Seq(n) => write!(f, "{}", n),
            Self::Unique(id) => write!(f, "U{:032x}", id),
        }
    }
}

/// Error returned when a page id string is malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsePageIdError;

impl fmt::Display for ParsePageIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed page id")
    }
}

impl std::error::Error for ParsePageIdError {}

impl FromStr for PageId {
    type Err = ParsePageIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(hex) = s.strip_prefix('U') {
            // Exactly 32 lowercase hex digits, nothing else.
            if hex.len() != 32 || !hex.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
                return Err(ParsePageIdError);
            }
            let id = u128::from_str_radix(hex, 16).map_err(|_| ParsePageIdError)?;
            return Ok(Self::Unique(id));
        }
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParsePageIdError);
        }
        s.parse::<u64>().map(Self::Seq).map_err(|_| ParsePageIdError)
    }
}

/// The recorded shape of one parameter within a [`State`].
///
/// Fixed parameters carry the ordered list of legal values exactly as they
/// were rendered, duplicates included: confidentiality mode maps a submitted
/// index into this list, so positions must match the generated markup.
/// Editable parameters store no values; their legality is delegated to a
/// pluggable rule at validation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateParameter {
    /// Selectable parameter with a recorded value set.
    Fixed {
        /// Legal values in render order, duplicates preserved.
        values: Vec<String>,
    },
    /// Free-text parameter delegated to an editable rule.
    Editable {
        /// Name of the data type / rule evaluating this parameter.
        data_type: String,
    },
}

impl StateParameter {
    /// Returns `true` for editable parameters.
    pub fn is_editable(&self) -> bool {
        matches!(self, Self::Editable { .. })
    }

    /// Returns the recorded values for a fixed parameter, or an empty slice
    /// for an editable one.
    pub fn values(&self) -> &[String] {
        match self {
            Self::Fixed { values } => values,
            Self::Editable { .. } => &[],
        }
    }
}

/// The legal submission set for one link or form of a rendered page.
///
/// A state records the `action` (target the client must submit back
/// unchanged), the parameter names that must always be present, and the
/// legal values of every non-editable parameter. States are write-once:
/// the composer appends to them, the validator only reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    state_id: u32,
    action: String,
    required_parameter_names: Vec<String>,
    // Insertion-ordered; lookups are linear but state parameter counts are
    // small (one entry per form field).
    parameters: Vec<(String, StateParameter)>,
}

impl State {
    /// Creates an empty state for the given action.
    pub(crate) fn new(state_id: u32, action: impl Into<String>) -> Self {
        Self {
            state_id,
            action: action.into(),
            required_parameter_names: Vec::new(),
            parameters: Vec::new(),
        }
    }

    /// Returns the state's sequence number within its page.
    pub fn state_id(&self) -> u32 {
        self.state_id
    }

    /// Returns the recorded action target.
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Returns the parameter names that must be present on submission.
    pub fn required_parameter_names(&self) -> &[String] {
        &self.required_parameter_names
    }

    /// Looks up a recorded parameter by name.
    pub fn parameter(&self, name: &str) -> Option<&StateParameter> {
        self.parameters
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, p)| p)
    }

    /// Iterates over recorded parameters in insertion order.
    pub fn parameters(&self) -> impl Iterator<Item = (&str, &StateParameter)> {
        self.parameters.iter().map(|(n, p)| (n.as_str(), p))
    }

    /// Marks a parameter name as required on submission.
    pub(crate) fn require_parameter(&mut self, name: &str) {
        if !self.required_parameter_names.iter().any(|n| n == name) {
            self.required_parameter_names.push(name.to_string());
        }
    }

    /// Appends a legal value for a non-editable parameter.
    ///
    /// Values are never deduplicated: repeated identical values keep their
    /// own positions so confidential indices line up with the rendered
    /// markup.
    pub(crate) fn add_value(&mut self, name: &str, value: impl Into<String>) {
        match self.parameters.iter_mut().find(|(n, _)| n == name) {
            Some((_, StateParameter::Fixed { values })) => values.push(value.into()),
            Some((_, StateParameter::Editable { .. })) => {
                // Recording a fixed value for an editable parameter is a
                // composer bug; the editable marker wins and the value is
                // dropped.
                debug_assert!(false, "fixed value recorded for editable parameter");
            }
            None => self.parameters.push((
                name.to_string(),
                StateParameter::Fixed {
                    values: vec![value.into()],
                },
            )),
        }
    }

    /// Marks a parameter as editable with the given rule/data-type name.
    pub(crate) fn mark_editable(&mut self, name: &str, data_type: impl Into<String>) {
        match self.parameters.iter_mut().find(|(n, _)| n == name) {
            Some((_, param)) => {
                *param = StateParameter::Editable {
                    data_type: data_type.into(),
                }
            }
            None => self.parameters.push((
                name.to_string(),
                StateParameter::Editable {
                    data_type: data_type.into(),
                },
            )),
        }
    }
}

/// One rendering pass: an anti-replay nonce plus the states recorded on it.
///
/// The random token is regenerated every time a page is composed from
/// scratch, which is what invalidates stale reference-strategy tokens after
/// a re-render.
#[derive(Debug, Clone)]
pub struct Page {
    page_id: PageId,
    random_token: String,
    states: Vec<State>,
}

impl Page {
    /// Creates an empty page with a fresh random token.
    pub(crate) fn new(page_id: PageId) -> Self {
        Self {
            page_id,
            random_token: fresh_token(),
            states: Vec::new(),
        }
    }

    /// Returns the page id.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns the page's anti-replay nonce.
    pub fn random_token(&self) -> &str {
        &self.random_token
    }

    /// Returns the state with the given sequence number, if recorded.
    pub fn state(&self, state_id: u32) -> Option<&State> {
        self.states.iter().find(|s| s.state_id() == state_id)
    }

    /// Returns how many states this page carries.
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Allocates the next state id on this page.
    pub(crate) fn next_state_id(&self) -> u32 {
        self.states.len() as u32
    }

    /// Commits a completed state to the page.
    pub(crate) fn push_state(&mut self, state: State) {
        self.states.push(state);
    }

    /// Regenerates the anti-replay nonce and drops the recorded states,
    /// standing in for a re-render of the same page id.
    #[cfg(test)]
    pub(crate) fn refresh_token(&mut self) {
        self.random_token = fresh_token();
        self.states.clear();
    }
}

/// 16 random bytes, hex-encoded.
fn fresh_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
