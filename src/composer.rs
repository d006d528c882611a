//! The write path: recording legal submission sets while a response renders.
//!
//! A [`PageComposer`] is opened once per rendering pass, records one
//! response unit (link or form) per [`UnitHandle`], and commits the whole
//! page to the session store only when [`PageComposer::finish`] runs. A
//! composer that is dropped instead (aborted request) leaves no trace in
//! the store.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::codec::{codec_for, StateCodec};
use crate::config::{Config, PagePolicy};
use crate::confidential::outbound_value;
use crate::error::EngineError;
use crate::state::{Page, State};
use crate::store::SessionState;

/// Handle to one open response unit (a link or form being rendered).
///
/// Handles are plain indices; they are only meaningful against the composer
/// that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitHandle(usize);

/// Records the legal targets and values of one rendered page.
///
/// Re-entrant per page: several units may be open at once (nested form
/// markup renders that way) and each unit closes independently with its own
/// token.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use parking_lot::Mutex;
/// use integrity_core::{Config, PageComposer, SessionState};
///
/// let config = Config::new();
/// let session = Arc::new(Mutex::new(SessionState::new(5)));
///
/// let mut composer = PageComposer::open(&config, Arc::clone(&session));
/// let form = composer.begin_unit("/buy");
/// composer.record_value(form, "qty", "1", false, "");
/// let token = composer.end_unit(form).unwrap();
/// composer.finish();
///
/// assert!(token.contains('-'));
/// ```
pub struct PageComposer {
    config: Config,
    codec: Box<dyn StateCodec>,
    session: Arc<Mutex<SessionState>>,
    page: Page,
    open_units: Vec<Option<State>>,
    next_state_id: u32,
}

impl PageComposer {
    /// Opens a composer for one rendering pass.
    ///
    /// Under [`PagePolicy::FreshPerDocument`] a new page with a fresh
    /// anti-replay nonce is started. Under [`PagePolicy::ReuseCurrent`] the
    /// session's current page is continued (its nonce and already-issued
    /// tokens stay valid); a session with no current page still starts a
    /// fresh one.
    pub fn open(config: &Config, session: Arc<Mutex<SessionState>>) -> Self {
        let page = {
            let mut guard = session.lock();
            match config.page_policy_kind() {
                PagePolicy::ReuseCurrent => guard
                    .current_page_id()
                    .and_then(|id| guard.take_page(id))
                    .unwrap_or_else(|| Page::new(guard.allocate_page_id())),
                PagePolicy::FreshPerDocument => Page::new(guard.allocate_page_id()),
            }
        };
        let next_state_id = page.next_state_id();
        Self {
            config: config.clone(),
            codec: codec_for(config),
            session,
            page,
            open_units: Vec::new(),
            next_state_id,
        }
    }

    /// Opens a response unit for the given target.
    pub fn begin_unit(&mut self, target: &str) -> UnitHandle {
        let state = State::new(self.next_state_id, target);
        self.next_state_id += 1;
        self.open_units.push(Some(state));
        UnitHandle(self.open_units.len() - 1)
    }

    /// Records a parameter value on an open unit and returns the string to
    /// embed in the markup.
    ///
    /// Non-editable values are appended to the parameter's ordered value
    /// list without deduplication; in confidential mode the returned string
    /// is the value's position, which is exactly what index resolution
    /// expects back. Editable values are not stored; the value passes
    /// through unchanged and `data_type` names the rule that will judge it
    /// at validation time.
    ///
    /// # Panics
    ///
    /// Panics if the handle was already closed; recording into a finished
    /// unit is a programming error.
    pub fn record_value(
        &mut self,
        handle: UnitHandle,
        name: &str,
        value: &str,
        editable: bool,
        data_type: &str,
    ) -> String {
        let state = self.unit_mut(handle);
        if editable {
            state.mark_editable(name, data_type);
            return value.to_string();
        }
        let position = state.parameter(name).map(|p| p.values().len()).unwrap_or(0);
        state.add_value(name, value);
        outbound_value(self.config.confidentiality_enabled(), position, value)
    }

    /// Marks a parameter of an open unit as required on submission.
    ///
    /// # Panics
    ///
    /// Panics if the handle was already closed.
    pub fn require_parameter(&mut self, handle: UnitHandle, name: &str) {
        self.unit_mut(handle).require_parameter(name);
    }

    /// Closes a unit, commits its state to the page and returns the token
    /// to embed in the generated markup.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] only for server-side faults while sealing
    /// the state (cipher strategy serialization/encryption).
    ///
    /// # Panics
    ///
    /// Panics if the handle was already closed.
    pub fn end_unit(&mut self, handle: UnitHandle) -> Result<String, EngineError> {
        let state = self.open_units[handle.0]
            .take()
            .expect("unit already closed");
        let token = {
            let mut guard = self.session.lock();
            self.codec.encode(&self.page, &state, &mut guard)?
        };
        self.page.push_state(state);
        tracing::debug!(
            page_id = %self.page.page_id(),
            state_count = self.page.state_count(),
            "response unit recorded"
        );
        Ok(token)
    }

    /// Commits the composed page to the session store.
    ///
    /// Units still open at this point were never closed by the renderer and
    /// are discarded.
    pub fn finish(self) {
        let mut guard = self.session.lock();
        guard.commit_page(self.page);
    }

    /// Returns the number of states committed to the page so far.
    pub fn state_count(&self) -> usize {
        self.page.state_count()
    }

    fn unit_mut(&mut self, handle: UnitHandle) -> &mut State {
        self.open_units[handle.0]
            .as_mut()
            .expect("unit already closed")
    }
}

impl std::fmt::Debug for PageComposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageComposer")
            .field("page_id", &self.page.page_id())
            .field("committed_states", &self.page.state_count())
            .field("open_units", &self.open_units.iter().filter(|u| u.is_some()).count())
            .finish()
    }
}
