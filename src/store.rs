//! Bounded per-session state storage.
//!
//! Each session owns a [`SessionState`]: an LRU-bounded cache of pages, the
//! saved-cookie snapshots and the lazily generated cipher key. All requests
//! of one session (multiple browser tabs included) share that state behind a
//! per-session mutex; the [`SessionStore`] maps session ids to it. There is
//! no global mutable state anywhere else in the engine.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::{Mutex, RwLock};

use crate::cipher::SessionKey;
use crate::confidential::SavedCookie;
use crate::state::{Page, PageId};

/// Per-session engine state: pages, cookie snapshots, key material.
///
/// Pages are evicted whole (all their states) once the session exceeds the
/// configured bound; every page access counts as a use, so eviction is LRU
/// and O(1) amortized.
pub struct SessionState {
    pages: LruCache<PageId, Page>,
    next_page_seq: u64,
    current_page: Option<PageId>,
    saved_cookies: HashMap<String, SavedCookie>,
    key: Option<SessionKey>,
}

impl SessionState {
    /// Creates session state bounded to `page_bound` pages.
    pub fn new(page_bound: usize) -> Self {
        let bound = NonZeroUsize::new(page_bound.max(1)).expect("bound is at least 1");
        Self {
            pages: LruCache::new(bound),
            next_page_seq: 0,
            current_page: None,
            saved_cookies: HashMap::new(),
            key: None,
        }
    }

    /// Allocates the next sequential page id for this session.
    pub(crate) fn allocate_page_id(&mut self) -> PageId {
        let id = PageId::Seq(self.next_page_seq);
        self.next_page_seq += 1;
        id
    }

    /// Commits a composed page, possibly evicting the least recently used
    /// one, and marks it as the session's current page.
    pub(crate) fn commit_page(&mut self, page: Page) {
        let id = page.page_id();
        self.pages.put(id, page);
        self.current_page = Some(id);
    }

    /// Removes and returns a page for continued composition.
    pub(crate) fn take_page(&mut self, id: PageId) -> Option<Page> {
        self.pages.pop(&id)
    }

    /// Returns the id of the most recently composed page.
    pub(crate) fn current_page_id(&self) -> Option<PageId> {
        self.current_page
    }

    /// Looks up a page, refreshing its LRU position.
    pub fn page(&mut self, id: PageId) -> Option<&Page> {
        self.pages.get(&id)
    }

    /// Returns how many pages the session currently holds.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Returns the session key, generating it on first use.
    ///
    /// The key never leaves server-side session state.
    pub fn key(&mut self) -> &SessionKey {
        self.key.get_or_insert_with(SessionKey::generate)
    }

    /// Records a cookie snapshot, replacing any previous one of the same
    /// name.
    pub(crate) fn save_cookie(&mut self, cookie: SavedCookie) {
        self.saved_cookies.insert(cookie.name().to_string(), cookie);
    }

    /// Looks up a cookie snapshot by name.
    pub fn saved_cookie(&self, name: &str) -> Option<&SavedCookie> {
        self.saved_cookies.get(name)
    }

    /// Drops every pending cookie snapshot (response reset).
    pub(crate) fn clear_cookies(&mut self) {
        self.saved_cookies.clear();
    }
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("pages", &self.pages.len())
            .field("saved_cookies", &self.saved_cookies.len())
            .field("key_present", &self.key.is_some())
            .finish()
    }
}

/// Concurrent map from session id to session state.
///
/// Reads (validation) and writes (composition) on the same session
/// interleave behind the per-session mutex; distinct sessions never contend
/// beyond the brief map lookup.
pub struct SessionStore {
    page_bound: usize,
    sessions: RwLock<HashMap<String, Arc<Mutex<SessionState>>>>,
}

impl SessionStore {
    /// Creates a store whose sessions are bounded to `page_bound` pages.
    pub fn new(page_bound: usize) -> Self {
        Self {
            page_bound,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the state for a session, creating it on first access.
    pub fn session(&self, session_id: &str) -> Arc<Mutex<SessionState>> {
        if let Some(state) = self.sessions.read().get(session_id) {
            return Arc::clone(state);
        }
        let mut sessions = self.sessions.write();
        Arc::clone(
            sessions
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(SessionState::new(self.page_bound)))),
        )
    }

    /// Discards a session: all pages, cookie snapshots and key material.
    pub fn end_session(&self, session_id: &str) {
        self.sessions.write().remove(session_id);
    }

    /// Returns how many sessions are live.
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("page_bound", &self.page_bound)
            .field("sessions", &self.session_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::State;

    fn page_with_state(state: &mut SessionState, action: &str) -> PageId {
        let id = state.allocate_page_id();
        let mut page = Page::new(id);
        page.push_state(State::new(0, action));
        state.commit_page(page);
        id
    }

    #[test]
    fn pages_evict_lru_past_the_bound() {
        let mut state = SessionState::new(2);
        let first = page_with_state(&mut state, "/a");
        let second = page_with_state(&mut state, "/b");
        let third = page_with_state(&mut state, "/c");

        assert!(state.page(first).is_none());
        assert!(state.page(second).is_some());
        assert!(state.page(third).is_some());
        assert_eq!(state.page_count(), 2);
    }

    #[test]
    fn page_access_refreshes_lru_position() {
        let mut state = SessionState::new(2);
        let first = page_with_state(&mut state, "/a");
        let second = page_with_state(&mut state, "/b");

        // Touch the older page, then evict: the middle page must go instead.
        assert!(state.page(first).is_some());
        let third = page_with_state(&mut state, "/c");

        assert!(state.page(first).is_some());
        assert!(state.page(second).is_none());
        assert!(state.page(third).is_some());
    }

    #[test]
    fn key_is_generated_once_per_session() {
        let mut state = SessionState::new(5);
        let first = state.key().digest(b"probe");
        let second = state.key().digest(b"probe");
        assert_eq!(first, second);
    }

    #[test]
    fn same_named_cookie_replaces_snapshot() {
        let mut state = SessionState::new(5);
        state.save_cookie(SavedCookie::new("pref", "a"));
        state.save_cookie(SavedCookie::new("pref", "b"));

        assert_eq!(state.saved_cookie("pref").unwrap().value(), "b");
    }

    #[test]
    fn clear_cookies_drops_all_snapshots() {
        let mut state = SessionState::new(5);
        state.save_cookie(SavedCookie::new("pref", "a"));
        state.clear_cookies();
        assert!(state.saved_cookie("pref").is_none());
    }

    #[test]
    fn store_hands_out_one_state_per_session() {
        let store = SessionStore::new(5);
        let a = store.session("s-1");
        let b = store.session("s-1");
        let c = store.session("s-2");

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(store.session_count(), 2);
    }

    #[test]
    fn ending_a_session_discards_its_state() {
        let store = SessionStore::new(5);
        {
            let session = store.session("s-1");
            page_with_state(&mut session.lock(), "/a");
        }
        store.end_session("s-1");

        // A new access starts from scratch.
        let session = store.session("s-1");
        assert_eq!(session.lock().page_count(), 0);
    }
}
