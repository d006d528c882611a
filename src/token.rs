//! The textual state token embedded in generated markup.
//!
//! Wire format: `pageId-stateId-suffix`, separator `'-'`. The suffix is
//! strategy-dependent (page nonce, ciphertext or payload+digest) and may
//! itself contain `'-'`; parsing therefore splits on the first two
//! separators only.

use std::fmt;

use crate::state::PageId;

/// Separator between the token's three fields.
pub(crate) const TOKEN_SEPARATOR: char = '-';

/// A parsed state token: page id, state id and the strategy suffix.
///
/// Parsing is strictly syntactic; it performs no verification. Whether the
/// suffix checks out is the codec's job.
///
/// # Examples
///
/// ```
/// use integrity_core::StateToken;
///
/// let token = StateToken::parse("4-0-9f86d081884c7d65").unwrap();
/// assert_eq!(token.state_id(), 0);
/// assert_eq!(token.suffix(), "9f86d081884c7d65");
/// assert_eq!(token.to_string(), "4-0-9f86d081884c7d65");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateToken {
    page_id: PageId,
    state_id: u32,
    suffix: String,
}

impl StateToken {
    /// Assembles a token from its parts.
    pub(crate) fn new(page_id: PageId, state_id: u32, suffix: impl Into<String>) -> Self {
        Self {
            page_id,
            state_id,
            suffix: suffix.into(),
        }
    }

    /// Parses a token string, returning `None` on any malformation.
    ///
    /// A `None` here is expected adversarial input, not a fault; callers
    /// map it to the `INVALID_PAGE_ID` / `INVALID_HDIV_PARAMETER_VALUE`
    /// catalog codes.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.splitn(3, TOKEN_SEPARATOR);
        let page_id = parts.next()?.parse::<PageId>().ok()?;
        let state_part = parts.next()?;
        if state_part.is_empty() || !state_part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let state_id = state_part.parse::<u32>().ok()?;
        let suffix = parts.next()?;
        if suffix.is_empty() {
            return None;
        }
        Some(Self {
            page_id,
            state_id,
            suffix: suffix.to_string(),
        })
    }

    /// Returns the page id field.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns the state id field.
    pub fn state_id(&self) -> u32 {
        self.state_id
    }

    /// Returns the strategy-dependent suffix.
    pub fn suffix(&self) -> &str {
        &self.suffix
    }
}

impl fmt::Display for StateToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}{}",
            self.page_id, TOKEN_SEPARATOR, self.state_id, TOKEN_SEPARATOR, self.suffix
        )
    }
}
