//! Integration tests for the web boundary.
//!
//! These tests drive the middleware the way an HTTP adapter would: build a
//! `RequestView` from inbound data, process it, and read the recovered
//! values back from the same view.

use std::sync::Arc;
use std::thread;

use integrity_core::web::{IntegrityMiddleware, Outcome, RequestView};
use integrity_core::{Config, PagePolicy, SavedCookie, Strategy, ValidationErrorKind};

/// Composes a one-field `/order` form and returns the token together with
/// the outbound rendering of the `product` parameter.
fn compose_order(mw: &IntegrityMiddleware, session: &str) -> (String, String) {
    let mut composer = mw.composer(session);
    let form = composer.begin_unit("/order");
    let outbound = composer.record_value(form, "product", "widget", false, "");
    composer.require_parameter(form, "product");
    let token = composer.end_unit(form).expect("compose");
    composer.finish();
    (token, outbound)
}

#[test]
fn full_request_cycle_through_the_view() {
    let mw = IntegrityMiddleware::new(Config::new());
    let (token, outbound) = compose_order(&mw, "sess-a");

    // Confidentiality renders the first value as its index.
    assert_eq!(outbound, "0");

    let mut request = RequestView::new("sess-a", "/order");
    request.add_parameter("_STATE_", token);
    request.add_parameter("product", outbound);

    match mw.process_request(&mut request) {
        Outcome::Continue(result) => {
            assert!(result.valid());
            assert_eq!(request.parameter_values("product"), ["widget"]);
        }
        Outcome::Reject(result) => panic!("unexpected rejection: {:?}", result.errors()),
    }
}

#[test]
fn sessions_are_isolated() {
    let mw = IntegrityMiddleware::new(Config::new());
    let (token, _) = compose_order(&mw, "sess-a");

    // A token composed for one session means nothing in another.
    let mut request = RequestView::new("sess-b", "/order");
    request.add_parameter("_STATE_", token);
    request.add_parameter("product", "0");

    let outcome = mw.process_request(&mut request);
    assert!(!outcome.should_continue());
    assert_eq!(
        outcome.result().errors()[0].kind(),
        ValidationErrorKind::InvalidPageId
    );
}

#[test]
fn missing_token_parameter_is_rejected() {
    let mw = IntegrityMiddleware::new(Config::new());
    compose_order(&mw, "sess-a");

    let mut request = RequestView::new("sess-a", "/order");
    request.add_parameter("product", "0");

    let outcome = mw.process_request(&mut request);
    assert!(!outcome.should_continue());
    assert_eq!(
        outcome.result().errors()[0].kind().code(),
        "HDIV_PARAMETER_DOES_NOT_EXIST"
    );
}

#[test]
fn debug_mode_reports_but_never_blocks() {
    let mw = IntegrityMiddleware::new(Config::new().debug_mode(true));
    compose_order(&mw, "sess-a");

    let mut request = RequestView::new("sess-a", "/order");
    request.add_parameter("_STATE_", "1-0-bogus");
    request.add_parameter("product", "0");

    let outcome = mw.process_request(&mut request);
    assert!(outcome.should_continue());
    assert!(!outcome.result().valid());
}

#[test]
fn start_pages_and_excluded_extensions_are_skipped() {
    let mw = IntegrityMiddleware::new(Config::new().start_page("^/login$"));

    for target in ["/login", "/assets/app.css", "/logo.png?v=3"] {
        let mut request = RequestView::new("sess-a", target);
        let outcome = mw.process_request(&mut request);
        assert!(outcome.should_continue(), "{target} should be skipped");
        assert!(outcome.result().errors().is_empty());
    }
}

#[test]
fn page_eviction_follows_the_session_bound() {
    let mw = IntegrityMiddleware::new(
        Config::new()
            .strategy(Strategy::Reference)
            .max_pages_per_session(3),
    );

    let (first_token, _) = compose_order(&mw, "sess-a");
    for _ in 0..3 {
        compose_order(&mw, "sess-a");
    }

    // The fourth composition pushed the first page out of the window.
    let mut request = RequestView::new("sess-a", "/order");
    request.add_parameter("_STATE_", first_token);
    request.add_parameter("product", "0");
    assert!(!mw.process_request(&mut request).should_continue());

    let session = mw.store().session("sess-a");
    assert_eq!(session.lock().page_count(), 3);
}

#[test]
fn reuse_current_policy_extends_the_live_page() {
    let mw = IntegrityMiddleware::new(
        Config::new()
            .strategy(Strategy::Reference)
            .page_policy(PagePolicy::ReuseCurrent)
            .max_pages_per_session(2),
    );

    let (first_token, _) = compose_order(&mw, "sess-a");
    for _ in 0..4 {
        compose_order(&mw, "sess-a");
    }

    // Every composition extended the same page, so the first token is
    // still resolvable and no eviction happened.
    let mut request = RequestView::new("sess-a", "/order");
    request.add_parameter("_STATE_", first_token);
    request.add_parameter("product", "0");
    assert!(mw.process_request(&mut request).should_continue());

    let session = mw.store().session("sess-a");
    assert_eq!(session.lock().page_count(), 1);
}

#[test]
fn ending_a_session_discards_its_pages() {
    let mw = IntegrityMiddleware::new(Config::new());
    let (token, _) = compose_order(&mw, "sess-a");

    mw.end_session("sess-a");

    let mut request = RequestView::new("sess-a", "/order");
    request.add_parameter("_STATE_", token);
    request.add_parameter("product", "0");

    assert!(!mw.process_request(&mut request).should_continue());
}

#[test]
fn cookie_confidentiality_end_to_end() {
    let mw = IntegrityMiddleware::new(Config::new().cookie_confidentiality(true));

    let overlay = mw.response_overlay("sess-a");
    let theme = overlay.set_cookie(SavedCookie::new("theme", "dark").path("/"));
    let lang = overlay.set_cookie(SavedCookie::new("lang", "eu"));
    assert_eq!(theme, "0");
    assert_eq!(lang, "0");

    let (token, _) = compose_order(&mw, "sess-a");

    let mut request = RequestView::new("sess-a", "/order");
    request.add_parameter("_STATE_", token);
    request.add_parameter("product", "0");
    request.add_cookie("theme", "0");
    request.add_cookie("lang", "0");
    request.add_cookie("SESSIONID", "opaque");

    assert!(mw.process_request(&mut request).should_continue());
    assert_eq!(request.cookie_value("theme"), Some("dark"));
    assert_eq!(request.cookie_value("lang"), Some("eu"));
    // The session cookie is never rewritten.
    assert_eq!(request.cookie_value("SESSIONID"), Some("opaque"));
}

#[test]
fn tampered_cookie_placeholder_is_rejected() {
    let mw = IntegrityMiddleware::new(Config::new().cookie_confidentiality(true));

    let overlay = mw.response_overlay("sess-a");
    overlay.set_cookie(SavedCookie::new("theme", "dark"));

    let (token, _) = compose_order(&mw, "sess-a");

    let mut request = RequestView::new("sess-a", "/order");
    request.add_parameter("_STATE_", token);
    request.add_parameter("product", "0");
    request.add_cookie("theme", "dark");

    let outcome = mw.process_request(&mut request);
    assert!(!outcome.should_continue());
    assert_eq!(
        outcome.result().errors()[0].kind(),
        ValidationErrorKind::InvalidCookie
    );
}

#[test]
fn concurrent_compose_and_validate_on_one_session() {
    let mw = Arc::new(IntegrityMiddleware::new(
        Config::new().strategy(Strategy::Cipher),
    ));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let mw = Arc::clone(&mw);
            thread::spawn(move || {
                for _ in 0..16 {
                    let (token, _) = compose_order(&mw, "shared");

                    let mut request = RequestView::new("shared", "/order");
                    request.add_parameter("_STATE_", token);
                    request.add_parameter("product", "0");
                    assert!(mw.process_request(&mut request).should_continue());
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("worker panicked");
    }

    // All workers shared one session entry.
    assert_eq!(mw.store().session_count(), 1);
}
