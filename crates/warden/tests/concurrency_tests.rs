//! Concurrent evaluation against a snapshot that is being replaced.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use warden::{Decision, Engine, EngineError, EntityUid, Request};

const ALLOW_ALL: &str = "permit(principal, action, resource);";
const DENY_ALL: &str = "permit(principal, action, resource);\nforbid(principal, action, resource);";

fn request() -> Request {
    Request::new(
        EntityUid::new("User", "alice"),
        EntityUid::new("Action", "view"),
        EntityUid::new("Photo", "p"),
    )
}

#[test]
fn test_readers_never_observe_torn_snapshots() {
    let engine = Engine::new().without_audit();
    engine.set_entities([]).expect("entities");
    engine.set_policies(ALLOW_ALL).expect("policies");

    let stop = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let engine = engine.clone();
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut seen = 0usize;
                while !stop.load(Ordering::Acquire) {
                    let response = engine.evaluate(&request()).expect("evaluate");
                    // Either snapshot is fine; a mix would show a permit reason on Deny.
                    match response.decision() {
                        Decision::Allow => assert_eq!(response.reasons().len(), 1),
                        Decision::Deny => {
                            assert_eq!(response.reasons().len(), 1);
                            assert_eq!(response.reasons()[0].as_str(), "policy1");
                        }
                    }
                    seen += 1;
                }
                seen
            })
        })
        .collect();

    for i in 0..200 {
        let text = if i % 2 == 0 { DENY_ALL } else { ALLOW_ALL };
        engine.set_policies(text).expect("reload");
    }
    stop.store(true, Ordering::Release);

    for reader in readers {
        reader.join().expect("reader thread panicked");
    }
}

#[test]
fn test_parallel_evaluation_matches_sequential() {
    let policies: String = (0..200)
        .map(|i| {
            if i % 50 == 49 {
                format!("forbid(principal, action, resource) when {{ context.n == {i} }};\n")
            } else {
                format!("permit(principal, action, resource) when {{ context.n >= {i} }};\n")
            }
        })
        .collect();

    let mut sequential_config = warden::WardenConfig::default();
    sequential_config.engine.parallel_threshold = 0;
    let sequential = Engine::with_config(&sequential_config).without_audit();
    let parallel = Engine::new().without_audit();

    for engine in [&sequential, &parallel] {
        engine.set_entities([]).expect("entities");
        engine.set_policies(&policies).expect("policies");
    }

    for n in [0i64, 10, 49, 99, 150] {
        let mut context = std::collections::BTreeMap::new();
        context.insert("n".to_string(), warden::Value::Long(n));
        let req = request().with_context(context);
        assert_eq!(
            sequential.evaluate(&req).expect("evaluate"),
            parallel.evaluate(&req).expect("evaluate")
        );
    }
}

#[test]
fn test_cancelled_evaluation_returns_error() {
    let engine = Engine::new().without_audit();
    engine.set_entities([]).expect("entities");
    engine.set_policies(ALLOW_ALL).expect("policies");

    let cancel = AtomicBool::new(true);
    assert_eq!(
        engine.evaluate_with_cancel(&request(), &cancel),
        Err(EngineError::Cancelled)
    );

    cancel.store(false, Ordering::Release);
    let response = engine.evaluate_with_cancel(&request(), &cancel).expect("evaluate");
    assert!(response.is_allowed());
}
