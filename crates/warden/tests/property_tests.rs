//! Property tests for engine-level decision invariants.

use proptest::prelude::*;
use warden::{Decision, Effect, Engine, Entity, EntityUid, PolicyId, Request};

const USERS: &[&str] = &["alice", "bob", "carol"];
const ACTIONS: &[&str] = &["view", "edit"];

fn policy_text() -> impl Strategy<Value = String> {
    (
        any::<bool>(),
        prop::option::of(prop::sample::select(USERS)),
        prop::option::of(prop::sample::select(ACTIONS)),
        prop::option::of(0i64..5),
        prop::collection::vec(("[a-z]{1,6}", "[a-zA-Z ]{0,12}"), 0..3),
    )
        .prop_map(|(forbid, user, action, min_level, annotations)| {
            let mut text = String::new();
            for (key, value) in annotations {
                text.push_str(&format!("@note_{key}(\"{value}\")\n"));
            }
            text.push_str(if forbid { "forbid(" } else { "permit(" });
            match user {
                Some(user) => text.push_str(&format!("principal == User::\"{user}\", ")),
                None => text.push_str("principal in Group::\"all\", "),
            }
            match action {
                Some(action) => text.push_str(&format!("action == Action::\"{action}\", ")),
                None => text.push_str("action, "),
            }
            text.push_str("resource)");
            if let Some(level) = min_level {
                text.push_str(&format!(" when {{ principal.level >= {level} }}"));
            }
            text.push_str(";\n");
            text
        })
}

fn entities() -> Vec<Entity> {
    let group = EntityUid::new("Group", "all");
    USERS
        .iter()
        .enumerate()
        .map(|(level, user)| {
            Entity::new(EntityUid::new("User", *user))
                .with_attr("level", i64::try_from(level).unwrap_or_default())
                .with_parent(group.clone())
        })
        .chain(std::iter::once(Entity::new(group.clone())))
        .collect()
}

fn engine(policies: &str) -> Engine {
    let engine = Engine::new().without_audit();
    engine.set_entities(entities()).expect("entities");
    engine.set_policies(policies).expect("policies");
    engine
}

fn request(user: &str, action: &str) -> Request {
    Request::new(
        EntityUid::new("User", user),
        EntityUid::new("Action", action),
        EntityUid::new("Photo", "p"),
    )
}

proptest! {
    #[test]
    fn prop_evaluation_is_deterministic(
        policies in prop::collection::vec(policy_text(), 0..16),
        user in prop::sample::select(USERS),
        action in prop::sample::select(ACTIONS),
    ) {
        let engine = engine(&policies.concat());
        let req = request(user, action);

        let first = serde_json::to_string(&engine.evaluate(&req).expect("evaluate")).expect("json");
        for _ in 0..3 {
            let again = serde_json::to_string(&engine.evaluate(&req).expect("evaluate")).expect("json");
            prop_assert_eq!(&first, &again);
        }
    }

    #[test]
    fn prop_forbid_reasons_are_only_forbids(
        policies in prop::collection::vec(policy_text(), 1..16),
        user in prop::sample::select(USERS),
        action in prop::sample::select(ACTIONS),
    ) {
        let set_text = policies.concat();
        let engine = engine(&set_text);
        let response = engine.evaluate(&request(user, action)).expect("evaluate");
        let snapshot = engine.snapshot().expect("snapshot");
        let set = snapshot.policies().expect("policies");

        for id in response.reasons() {
            let policy = set.get(id).expect("reason names a policy");
            let expected = match response.decision() {
                Decision::Deny => Effect::Forbid,
                Decision::Allow => Effect::Permit,
            };
            prop_assert_eq!(policy.effect(), expected);
        }
    }

    #[test]
    fn prop_unnamed_policies_numbered_in_order(
        policies in prop::collection::vec(policy_text(), 0..16),
    ) {
        let engine = engine(&policies.concat());
        let snapshot = engine.snapshot().expect("snapshot");
        let ids: Vec<PolicyId> = snapshot
            .policies()
            .expect("policies")
            .iter()
            .map(|p| p.id().clone())
            .collect();
        let expected: Vec<PolicyId> = (0..policies.len()).map(PolicyId::from_index).collect();
        prop_assert_eq!(ids, expected);
    }

    #[test]
    fn prop_annotations_round_trip_for_reasons_only(
        policies in prop::collection::vec(policy_text(), 0..16),
        user in prop::sample::select(USERS),
        action in prop::sample::select(ACTIONS),
    ) {
        let engine = engine(&policies.concat());
        let response = engine.evaluate(&request(user, action)).expect("evaluate");
        let snapshot = engine.snapshot().expect("snapshot");
        let set = snapshot.policies().expect("policies");

        let expected: Vec<(String, String, String)> = response
            .reasons()
            .iter()
            .filter_map(|id| set.get(id))
            .flat_map(|policy| {
                policy.reported_annotations().map(move |(k, v)| {
                    (policy.id().to_string(), k.to_string(), v.to_string())
                })
            })
            .collect();
        let actual: Vec<(String, String, String)> = response
            .annotations
            .iter()
            .map(|a| (a.policy.to_string(), a.key.clone(), a.value.clone()))
            .collect();
        prop_assert_eq!(actual, expected);
    }
}

#[test]
fn test_empty_policy_set_denies_everything() {
    let engine = engine("");
    for user in USERS {
        for action in ACTIONS {
            let response = engine.evaluate(&request(user, action)).expect("evaluate");
            assert_eq!(response.decision(), Decision::Deny);
            assert!(response.reasons().is_empty());
        }
    }
}
