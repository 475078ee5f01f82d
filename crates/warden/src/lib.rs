//! # Warden
//!
//! Attribute-based access-control decision engine.
//!
//! Given a request (principal, action, resource, context), a set of entities,
//! and a set of declarative policies, Warden computes an Allow/Deny decision
//! plus diagnostics explaining why:
//!
//! - **Forbid overrides permit** - any satisfied `forbid` denies
//! - **Default deny** - no satisfied policy means Deny with no reasons
//! - **Errors stay local** - a failing condition only excludes its own policy
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                          Engine                          │
//! │  set_policies ──▶ PolicySet ┐                            │
//! │                             ├──▶ Snapshot (Arc swap)     │
//! │  set_entities ──▶ EntityStore┘          │                │
//! │                                         ▼                │
//! │  evaluate(Request) ──────────────▶ Authorizer ──▶ Response│
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - **Engine**: [`Engine`], [`Snapshot`] - loading and evaluation
//! - **Wire form**: [`EvalRequest`], [`entities_from_json`] - JSON decoding
//! - **Policy language**: re-exported from `warden-policy`
//! - **Data model**: re-exported from `warden-types`

mod engine;
mod error;
mod json;

pub use engine::{Engine, Snapshot};
pub use error::{EngineError, Result};
pub use json::{EvalRequest, entities_from_json, parse_uid, uid_from_json, value_from_json};

pub use warden_config::{ConfigLoader, WardenConfig};
pub use warden_policy::{
    AnnotationRecord, Authorizer, Decision, Diagnostics, Effect, EvalError, EvalErrorKind,
    EvaluationResponse, ParseError, Policy, PolicyEvalError, PolicyId, PolicySet, PolicySetError,
    Request, Response,
};
pub use warden_types::{Entity, EntityStore, EntityType, EntityUid, StoreError, Value};
