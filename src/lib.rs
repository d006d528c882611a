//! Request-integrity enforcement for server-rendered web applications.
//!
//! This crate prevents tampering with parameters, links, form fields and
//! cookies that a client should only ever *select* from a server-issued set
//! of values, not invent:
//! - **Composer**: records, per rendered page, the exact legal submission
//!   set of every outbound link and form
//! - **Tokens**: a compact unforgeable reference to that record, embedded
//!   in the generated markup (three interchangeable strategies)
//! - **Validator**: re-checks every inbound request against the record
//! - **Confidentiality mode**: hides real values from the client entirely,
//!   transmitting positional indices and placeholder cookies instead
//!
//! # Core Types
//!
//! - [`Config`]: strategy, confidentiality and policy switches
//! - [`PageComposer`]: the write path, one per rendered response
//! - [`web::IntegrityMiddleware`]: the read path, wired into the pipeline
//! - [`ValidationResult`] / [`ValidationError`]: the structured outcome
//! - [`SessionStore`]: bounded per-session state (pages, cookies, keys)
//!
//! # Examples
//!
//! ```
//! use integrity_core::web::{IntegrityMiddleware, RequestView};
//! use integrity_core::Config;
//!
//! let middleware = IntegrityMiddleware::new(Config::new());
//!
//! // While rendering: record the form and embed the returned strings.
//! let mut composer = middleware.composer("session-9");
//! let form = composer.begin_unit("/buy");
//! let qty_small = composer.record_value(form, "qty", "1", false, "");
//! let qty_large = composer.record_value(form, "qty", "10", false, "");
//! let token = composer.end_unit(form).expect("reference tokens cannot fail");
//! composer.finish();
//!
//! // Confidentiality is on by default: the client only sees positions.
//! assert_eq!((qty_small.as_str(), qty_large.as_str()), ("0", "1"));
//!
//! // On submission: validate, then read the recovered real value.
//! let mut request = RequestView::new("session-9", "/buy");
//! request.add_parameter("_STATE_", token);
//! request.add_parameter("qty", "1");
//!
//! let outcome = middleware.process_request(&mut request);
//! assert!(outcome.should_continue());
//! assert_eq!(request.parameter_values("qty"), ["10"]);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod cipher;
mod codec;
mod composer;
mod config;
mod confidential;
mod editable;
mod error;
mod state;
mod store;
mod token;
mod validator;
pub mod web;

pub use cipher::{CipherError, SessionKey};
pub use codec::{codec_for, CipherCodec, DecodeError, HashCodec, ReferenceCodec, StateCodec};
pub use composer::{PageComposer, UnitHandle};
pub use config::{Config, ExemptPredicate, PagePolicy, ParseStrategyError, Strategy};
pub use confidential::{capture_cookie, check_cookies, CookieCheck, SavedCookie, COOKIE_PLACEHOLDER};
pub use editable::{
    AcceptAllEditable, EditableRuleEvaluator, EditableViolation, RejectAllEditable, RulePolarity,
    RuleRegistry,
};
pub use error::{EngineError, ValidationError, ValidationErrorKind, ValidationResult};
pub use state::{Page, PageId, ParsePageIdError, State, StateParameter};
pub use store::{SessionState, SessionStore};
pub use token::StateToken;
pub use validator::{SubmittedParameter, Validation, Validator};
