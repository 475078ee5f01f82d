//! Decision engine: evaluates every policy for a request and combines the
//! outcomes with forbid-overrides-permit precedence.
//!
//! Per policy, in source order:
//! 1. The three scope clauses are matched against the request UIDs.
//! 2. If the scope applies, `when`/`unless` clauses are evaluated in order.
//! 3. An evaluation error excludes the policy and is recorded in
//!    [`Diagnostics::errors`]; it never fails the request.
//!
//! Any satisfied `forbid` yields Deny with the forbids as reasons. Otherwise any
//! satisfied `permit` yields Allow. Otherwise the request is denied with no
//! reasons (default deny).

use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;
use warden_types::{EntityStore, EntityUid, Value};

use crate::ast::{ConditionKind, Effect, Policy, PolicyId, ScopeConstraint};
use crate::error::{Cancelled, EvalError};
use crate::evaluator::{Env, evaluate_bool};
use crate::policy_set::PolicySet;

/// Policy count at which evaluation fans out across the rayon pool.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 64;

// ============================================================================
// Request / Response
// ============================================================================

/// An authorization request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub principal: EntityUid,
    pub action: EntityUid,
    pub resource: EntityUid,
    pub context: BTreeMap<String, Value>,
}

impl Request {
    /// Creates a request with an empty context.
    pub fn new(principal: EntityUid, action: EntityUid, resource: EntityUid) -> Self {
        Self {
            principal,
            action,
            resource,
            context: BTreeMap::new(),
        }
    }

    pub fn with_context(mut self, context: BTreeMap<String, Value>) -> Self {
        self.context = context;
        self
    }
}

/// Final authorization decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decision {
    Allow,
    #[default]
    Deny,
}

impl Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Allow => f.write_str("Allow"),
            Decision::Deny => f.write_str("Deny"),
        }
    }
}

/// An evaluation error attributed to one policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyEvalError {
    pub policy: PolicyId,
    pub message: String,
}

/// Why a decision was made.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Policies that determined the decision, in source order.
    pub reason: Vec<PolicyId>,
    /// Per-policy evaluation errors, in source order.
    pub errors: Vec<PolicyEvalError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub decision: Decision,
    pub diagnostics: Diagnostics,
}

/// One annotation of a policy listed in [`Diagnostics::reason`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub policy: PolicyId,
    pub key: String,
    pub value: String,
}

/// Decision, diagnostics, and annotations of the contributing policies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResponse {
    pub response: Response,
    pub annotations: Vec<AnnotationRecord>,
}

impl EvaluationResponse {
    pub fn decision(&self) -> Decision {
        self.response.decision
    }

    pub fn is_allowed(&self) -> bool {
        self.response.decision == Decision::Allow
    }

    /// Policy ids that determined the decision.
    pub fn reasons(&self) -> &[PolicyId] {
        &self.response.diagnostics.reason
    }

    pub fn errors(&self) -> &[PolicyEvalError] {
        &self.response.diagnostics.errors
    }
}

// ============================================================================
// Authorizer
// ============================================================================

#[derive(Debug)]
enum Outcome {
    NotApplicable,
    Satisfied,
    Failed(EvalError),
}

/// Evaluates requests against a policy set and an entity store.
///
/// Stateless; the same instance may be shared across threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Authorizer {
    parallel_threshold: usize,
}

impl Default for Authorizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Authorizer {
    pub fn new() -> Self {
        Self {
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }

    /// Sets the policy count at which evaluation runs in parallel.
    /// Zero keeps evaluation sequential.
    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    pub fn parallel_threshold(&self) -> usize {
        self.parallel_threshold
    }

    /// Evaluates `request` and returns the combined response. Always total.
    pub fn is_authorized(
        &self,
        policies: &PolicySet,
        entities: &EntityStore,
        request: &Request,
    ) -> EvaluationResponse {
        let env = env_for(request, entities);
        let outcomes: Vec<Outcome> = if self.runs_parallel(policies) {
            policies
                .policies()
                .par_iter()
                .map(|policy| evaluate_policy(policy, &env))
                .collect()
        } else {
            policies
                .iter()
                .map(|policy| evaluate_policy(policy, &env))
                .collect()
        };
        combine(policies, outcomes)
    }

    /// Like [`is_authorized`](Self::is_authorized), but checks `cancel` before
    /// each policy. A cancelled evaluation returns no response at all.
    pub fn is_authorized_with_cancel(
        &self,
        policies: &PolicySet,
        entities: &EntityStore,
        request: &Request,
        cancel: &AtomicBool,
    ) -> Result<EvaluationResponse, Cancelled> {
        let env = env_for(request, entities);
        let checked = |policy: &Policy| {
            if cancel.load(Ordering::Acquire) {
                None
            } else {
                Some(evaluate_policy(policy, &env))
            }
        };
        let outcomes: Option<Vec<Outcome>> = if self.runs_parallel(policies) {
            policies.policies().par_iter().map(checked).collect()
        } else {
            policies.iter().map(checked).collect()
        };
        outcomes
            .map(|outcomes| combine(policies, outcomes))
            .ok_or(Cancelled)
    }

    fn runs_parallel(&self, policies: &PolicySet) -> bool {
        self.parallel_threshold > 0 && policies.len() >= self.parallel_threshold
    }
}

fn env_for<'a>(request: &'a Request, entities: &'a EntityStore) -> Env<'a> {
    Env {
        principal: &request.principal,
        action: &request.action,
        resource: &request.resource,
        context: &request.context,
        entities,
    }
}

// ============================================================================
// Per-policy Evaluation
// ============================================================================

fn evaluate_policy(policy: &Policy, env: &Env<'_>) -> Outcome {
    let scope = policy.scope();
    let applicable = scope_matches(&scope.principal, env.principal, env.entities)
        && scope_matches(&scope.action, env.action, env.entities)
        && scope_matches(&scope.resource, env.resource, env.entities);
    if !applicable {
        return Outcome::NotApplicable;
    }

    for condition in policy.conditions() {
        let holds = match evaluate_bool(&condition.body, env) {
            Ok(value) => value,
            Err(err) => return Outcome::Failed(err),
        };
        let required = condition.kind == ConditionKind::When;
        if holds != required {
            return Outcome::NotApplicable;
        }
    }
    Outcome::Satisfied
}

fn scope_matches(constraint: &ScopeConstraint, uid: &EntityUid, entities: &EntityStore) -> bool {
    match constraint {
        ScopeConstraint::Any => true,
        ScopeConstraint::Eq(expected) => uid == expected,
        ScopeConstraint::In(ancestor) => entities.is_ancestor(ancestor, uid),
        ScopeConstraint::InAny(ancestors) => ancestors
            .iter()
            .any(|ancestor| entities.is_ancestor(ancestor, uid)),
        ScopeConstraint::Is(entity_type) => uid.entity_type() == entity_type,
        ScopeConstraint::IsIn(entity_type, ancestor) => {
            uid.entity_type() == entity_type && entities.is_ancestor(ancestor, uid)
        }
    }
}

// ============================================================================
// Combination
// ============================================================================

/// Folds per-policy outcomes (aligned with `policies`) into a response.
fn combine(policies: &PolicySet, outcomes: Vec<Outcome>) -> EvaluationResponse {
    let mut forbids: Vec<&Policy> = Vec::new();
    let mut permits: Vec<&Policy> = Vec::new();
    let mut errors = Vec::new();

    for (policy, outcome) in policies.iter().zip(outcomes) {
        match outcome {
            Outcome::NotApplicable => {}
            Outcome::Satisfied => match policy.effect() {
                Effect::Forbid => forbids.push(policy),
                Effect::Permit => permits.push(policy),
            },
            Outcome::Failed(err) => {
                debug!(policy = %policy.id(), error = %err, "Policy evaluation failed");
                errors.push(PolicyEvalError {
                    policy: policy.id().clone(),
                    message: err.to_string(),
                });
            }
        }
    }

    let (decision, contributing) = if !forbids.is_empty() {
        (Decision::Deny, forbids)
    } else if !permits.is_empty() {
        (Decision::Allow, permits)
    } else {
        (Decision::Deny, Vec::new())
    };

    let annotations = contributing
        .iter()
        .flat_map(|policy| {
            policy
                .reported_annotations()
                .map(move |(key, value)| AnnotationRecord {
                    policy: policy.id().clone(),
                    key: key.to_string(),
                    value: value.to_string(),
                })
        })
        .collect();

    EvaluationResponse {
        response: Response {
            decision,
            diagnostics: Diagnostics {
                reason: contributing.iter().map(|p| p.id().clone()).collect(),
                errors,
            },
        },
        annotations,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;
    use warden_types::Entity;

    fn uid(ty: &str, id: &str) -> EntityUid {
        EntityUid::new(ty, id)
    }

    fn request(principal: &str, action: &str, resource: &str) -> Request {
        Request::new(
            uid("User", principal),
            uid("Action", action),
            uid("Photo", resource),
        )
    }

    fn store() -> EntityStore {
        EntityStore::load([
            Entity::new(uid("User", "alice"))
                .with_attr("department", "eng")
                .with_parent(uid("Group", "admins")),
            Entity::new(uid("User", "bob")).with_attr("department", "sales"),
            Entity::new(uid("Action", "view")).with_parent(uid("Action", "read")),
            Entity::new(uid("Photo", "a.jpg")).with_parent(uid("Album", "trip")),
            Entity::new(uid("Group", "admins")),
            Entity::new(uid("Action", "read")),
            Entity::new(uid("Album", "trip")),
        ])
        .expect("load")
    }

    fn run(policies: &str, req: &Request) -> EvaluationResponse {
        let set: PolicySet = policies.parse().expect("parse");
        Authorizer::new().is_authorized(&set, &store(), req)
    }

    fn ids(response: &EvaluationResponse) -> Vec<&str> {
        response.reasons().iter().map(PolicyId::as_str).collect()
    }

    #[test]
    fn test_default_deny_on_empty_set() {
        let response = run("", &request("alice", "view", "a.jpg"));
        assert_eq!(response.decision(), Decision::Deny);
        assert!(response.reasons().is_empty());
        assert!(response.errors().is_empty());
        assert!(response.annotations.is_empty());
    }

    #[test]
    fn test_forbid_overrides_earlier_and_later_permits() {
        let text = r#"
            permit(principal, action, resource);
            forbid(principal == User::"alice", action, resource);
            permit(principal in Group::"admins", action, resource);
        "#;
        let response = run(text, &request("alice", "view", "a.jpg"));
        assert_eq!(response.decision(), Decision::Deny);
        assert_eq!(ids(&response), vec!["policy1"]);

        let response = run(text, &request("bob", "view", "a.jpg"));
        assert_eq!(response.decision(), Decision::Allow);
        assert_eq!(ids(&response), vec!["policy0"]);
    }

    #[test_case(r#"permit(principal in Group::"admins", action, resource);"#, "alice" => Decision::Allow; "principal in group")]
    #[test_case(r#"permit(principal, action in [Action::"read"], resource);"#, "bob" => Decision::Allow; "action in list")]
    #[test_case(r#"permit(principal, action, resource is Photo in Album::"trip");"#, "bob" => Decision::Allow; "resource is in")]
    #[test_case(r#"permit(principal is Group, action, resource);"#, "alice" => Decision::Deny; "principal wrong type")]
    #[test_case(r#"permit(principal, action == Action::"read", resource);"#, "alice" => Decision::Deny; "eq is not hierarchical")]
    #[test_case(r#"permit(principal, action, resource) when { principal.department == "eng" };"#, "alice" => Decision::Allow; "when holds")]
    #[test_case(r#"permit(principal, action, resource) unless { principal.department == "eng" };"#, "alice" => Decision::Deny; "unless holds")]
    #[test_case(r#"permit(principal, action, resource) when { true } when { false };"#, "alice" => Decision::Deny; "all clauses conjoined")]
    fn test_scope_and_conditions(policy: &str, principal: &str) -> Decision {
        run(policy, &request(principal, "view", "a.jpg")).decision()
    }

    #[test]
    fn test_eval_error_is_recorded_not_fatal() {
        let text = r#"
            permit(principal, action, resource) when { principal.missing };
            permit(principal == User::"alice", action, resource);
        "#;
        let response = run(text, &request("alice", "view", "a.jpg"));
        assert_eq!(response.decision(), Decision::Allow);
        assert_eq!(ids(&response), vec!["policy1"]);
        assert_eq!(
            response.errors(),
            &[PolicyEvalError {
                policy: PolicyId::new("policy0"),
                message: "attribute `missing` not found on User::\"alice\"".into(),
            }]
        );
    }

    #[test]
    fn test_errors_in_source_order() {
        let text = r#"
            permit(principal, action, resource) when { foo };
            forbid(principal, action, resource) when { 1 };
            permit(principal, action, resource) when { bar };
        "#;
        let response = run(text, &request("alice", "view", "a.jpg"));
        assert_eq!(response.decision(), Decision::Deny);
        let failing: Vec<&str> = response.errors().iter().map(|e| e.policy.as_str()).collect();
        assert_eq!(failing, vec!["policy0", "policy1", "policy2"]);
    }

    #[test]
    fn test_error_skipped_when_scope_does_not_apply() {
        let text = r#"permit(principal == User::"bob", action, resource) when { foo };"#;
        let response = run(text, &request("alice", "view", "a.jpg"));
        assert!(response.errors().is_empty());
    }

    #[test]
    fn test_annotations_only_from_contributing_policies() {
        let text = r#"
            @id("reader")
            @description("readers")
            @owner("team-a")
            permit(principal, action, resource);
            @description("never")
            permit(principal == User::"nobody", action, resource);
        "#;
        let response = run(text, &request("alice", "view", "a.jpg"));
        assert_eq!(
            response.annotations,
            vec![
                AnnotationRecord {
                    policy: PolicyId::new("policy0"),
                    key: "description".into(),
                    value: "readers".into(),
                },
                AnnotationRecord {
                    policy: PolicyId::new("policy0"),
                    key: "owner".into(),
                    value: "team-a".into(),
                },
            ]
        );
    }

    #[test]
    fn test_cancel_returns_no_response() {
        let set: PolicySet = "permit(principal, action, resource);".parse().expect("parse");
        let cancel = AtomicBool::new(true);
        let result = Authorizer::new().is_authorized_with_cancel(
            &set,
            &store(),
            &request("alice", "view", "a.jpg"),
            &cancel,
        );
        assert_eq!(result, Err(Cancelled));

        cancel.store(false, Ordering::Release);
        let result = Authorizer::new().is_authorized_with_cancel(
            &set,
            &store(),
            &request("alice", "view", "a.jpg"),
            &cancel,
        );
        assert!(result.is_ok_and(|r| r.is_allowed()));
    }

    #[test]
    fn test_response_serializes_in_wire_shape() {
        let response = run(
            "@description(\"d\") permit(principal, action, resource);",
            &request("alice", "view", "a.jpg"),
        );
        let json = serde_json::to_value(&response).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({
                "response": {
                    "decision": "Allow",
                    "diagnostics": { "reason": ["policy0"], "errors": [] }
                },
                "annotations": [
                    { "policy": "policy0", "key": "description", "value": "d" }
                ]
            })
        );
    }

    // ------------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------------

    #[derive(Debug, Clone)]
    struct GenPolicy {
        forbid: bool,
        principal: Option<&'static str>,
        condition: Option<bool>,
    }

    fn gen_policy() -> impl Strategy<Value = GenPolicy> {
        (
            any::<bool>(),
            prop::option::of(prop::sample::select(vec!["alice", "bob", "carol"])),
            prop::option::of(any::<bool>()),
        )
            .prop_map(|(forbid, principal, condition)| GenPolicy {
                forbid,
                principal,
                condition,
            })
    }

    fn render(policies: &[GenPolicy]) -> String {
        policies
            .iter()
            .map(|p| {
                let effect = if p.forbid { "forbid" } else { "permit" };
                let principal = match p.principal {
                    Some(name) => format!("principal == User::\"{name}\""),
                    None => "principal".to_string(),
                };
                let condition = match p.condition {
                    Some(c) => format!(" when {{ {c} }}"),
                    None => String::new(),
                };
                format!("{effect}({principal}, action, resource){condition};\n")
            })
            .collect()
    }

    fn satisfied(p: &GenPolicy, principal: &str) -> bool {
        p.principal.is_none_or(|name| name == principal) && p.condition.unwrap_or(true)
    }

    proptest! {
        #[test]
        fn prop_forbid_precedence_and_default_deny(
            policies in prop::collection::vec(gen_policy(), 0..12),
            principal in prop::sample::select(vec!["alice", "bob", "carol"]),
        ) {
            let set: PolicySet = render(&policies).parse().expect("parse");
            let response = Authorizer::new()
                .is_authorized(&set, &EntityStore::empty(), &request(principal, "view", "a.jpg"));

            let expect_forbid: Vec<String> = policies.iter().enumerate()
                .filter(|(_, p)| p.forbid && satisfied(p, principal))
                .map(|(i, _)| format!("policy{i}"))
                .collect();
            let expect_permit: Vec<String> = policies.iter().enumerate()
                .filter(|(_, p)| !p.forbid && satisfied(p, principal))
                .map(|(i, _)| format!("policy{i}"))
                .collect();
            let reasons: Vec<String> = response.reasons().iter().map(ToString::to_string).collect();

            if !expect_forbid.is_empty() {
                prop_assert_eq!(response.decision(), Decision::Deny);
                prop_assert_eq!(reasons, expect_forbid);
            } else if !expect_permit.is_empty() {
                prop_assert_eq!(response.decision(), Decision::Allow);
                prop_assert_eq!(reasons, expect_permit);
            } else {
                prop_assert_eq!(response.decision(), Decision::Deny);
                prop_assert!(reasons.is_empty());
            }
        }

        #[test]
        fn prop_parallel_matches_sequential(
            policies in prop::collection::vec(gen_policy(), 0..24),
            principal in prop::sample::select(vec!["alice", "bob", "carol"]),
        ) {
            let set: PolicySet = render(&policies).parse().expect("parse");
            let req = request(principal, "view", "a.jpg");
            let store = EntityStore::empty();

            let sequential = Authorizer::new().with_parallel_threshold(0).is_authorized(&set, &store, &req);
            let parallel = Authorizer::new().with_parallel_threshold(1).is_authorized(&set, &store, &req);
            let again = Authorizer::new().with_parallel_threshold(1).is_authorized(&set, &store, &req);
            prop_assert_eq!(&sequential, &parallel);
            prop_assert_eq!(&parallel, &again);
        }
    }
}
