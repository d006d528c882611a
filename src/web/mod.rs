//! Host-framework integration surface.
//!
//! This module is the boundary between the web framework's pipeline and the
//! engine. It contains no framework-specific code; integrations map their
//! request type into a [`RequestView`], hand it to
//! [`IntegrityMiddleware::process_request`], and decide what to do with the
//! returned [`Outcome`].
//!
//! # Design Principles
//!
//! 1. **Composition over decoration**: the request is not wrapped or
//!    subclassed; the adapter owns copies of the inputs plus an overlay for
//!    recovered values.
//! 2. **The engine never answers HTTP**: rejects carry typed errors; the
//!    integration picks the response (error page, login redirect, or
//!    continue-and-log in debug mode).
//! 3. **Explicit context**: no globals, no thread-locals. Session identity
//!    travels inside the [`RequestView`].
//!
//! # Integration Flow
//!
//! ```text
//! response rendering                      next inbound request
//!   middleware.composer(session)            RequestView::from(http_req)
//!   begin_unit / record_value / end_unit    middleware.process_request(&mut view)
//!   embed tokens in markup                  Continue -> next stage reads real values
//!   composer.finish()                       Reject   -> integration diverts
//! ```

mod adapter;
mod middleware;

pub use adapter::{RequestView, ResponseOverlay};
pub use middleware::{IntegrityMiddleware, Outcome};
