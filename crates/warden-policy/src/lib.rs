//! # warden-policy: Policy language and decision engine
//!
//! Turns policy text into typed [`Policy`] trees and evaluates requests
//! against them.
//!
//! ## Architecture
//!
//! ```text
//! policy text ──▶ lexer ──▶ parser ──▶ PolicySet
//!                                          │
//! Request + EntityStore ──────────────▶ Authorizer ──▶ EvaluationResponse
//!                                          │
//!                                      evaluator (per policy condition)
//! ```
//!
//! Decisions combine with forbid-overrides-permit precedence and default to
//! Deny. Evaluation errors are scoped to a single policy and reported in the
//! response diagnostics.
//!
//! ## Examples
//!
//! ```
//! use warden_policy::{Authorizer, Decision, PolicySet, Request};
//! use warden_types::{EntityStore, EntityUid};
//!
//! let policies: PolicySet = r#"
//!     permit(
//!         principal == User::"alice",
//!         action == Action::"update",
//!         resource == Photo::"VacationPhoto94.jpg"
//!     );
//! "#.parse()?;
//!
//! let request = Request::new(
//!     EntityUid::new("User", "alice"),
//!     EntityUid::new("Action", "update"),
//!     EntityUid::new("Photo", "VacationPhoto94.jpg"),
//! );
//!
//! let response = Authorizer::new().is_authorized(&policies, &EntityStore::empty(), &request);
//! assert_eq!(response.decision(), Decision::Allow);
//! assert_eq!(response.reasons()[0].as_str(), "policy0");
//! # Ok::<(), warden_policy::PolicySetError>(())
//! ```

pub mod ast;
pub mod authorizer;
mod error;
pub mod evaluator;
mod lexer;
pub mod parser;
mod policy_set;

pub use ast::{Effect, Expr, Policy, PolicyId};
pub use authorizer::{
    AnnotationRecord, Authorizer, Decision, Diagnostics, EvaluationResponse, PolicyEvalError,
    Request, Response,
};
pub use error::{Cancelled, EvalError, EvalErrorKind, ParseError, PolicySetError};
pub use parser::{parse_entity_uid, parse_expression, parse_policies, DEFAULT_MAX_NESTING_DEPTH};
pub use policy_set::PolicySet;
