//! The host-facing engine: holds the active snapshot and evaluates requests.
//!
//! Loading builds a complete replacement off to the side, then takes the
//! write lock only to combine it with the other half of the current snapshot
//! and swap the `Arc`. Evaluations clone the `Arc` under a read lock and run
//! without holding any lock, so they see either the old or the new snapshot,
//! never a mix.

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, RwLock};

use tracing::{info, warn};
use warden_config::WardenConfig;
use warden_policy::{Authorizer, EvaluationResponse, PolicySet, Request};
use warden_types::{Entity, EntityStore};

use crate::error::{EngineError, Result};
use crate::json::{EvalRequest, entities_from_json};

// ============================================================================
// Snapshot
// ============================================================================

/// An immutable pairing of loaded policies and entities.
#[derive(Debug, Default)]
pub struct Snapshot {
    version: u64,
    policies: Option<Arc<PolicySet>>,
    entities: Option<Arc<EntityStore>>,
}

impl Snapshot {
    /// Increments on every successful load. 0 means nothing was ever loaded.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn policies(&self) -> Option<&PolicySet> {
        self.policies.as_deref()
    }

    pub fn entities(&self) -> Option<&EntityStore> {
        self.entities.as_deref()
    }

    fn loaded(&self) -> Result<(&PolicySet, &EntityStore)> {
        let policies = self
            .policies()
            .ok_or(EngineError::NotInitialized { missing: "policies" })?;
        let entities = self
            .entities()
            .ok_or(EngineError::NotInitialized { missing: "entities" })?;
        Ok((policies, entities))
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Authorization engine handle.
///
/// Cheap to clone; clones share the same snapshot.
///
/// # Example
///
/// ```
/// use warden::{Engine, EvalRequest};
///
/// let engine = Engine::new().without_audit();
/// engine.set_entities_from_json("[]")?;
/// engine.set_policies(r#"
///     permit(
///         principal == User::"alice",
///         action    == Action::"update",
///         resource  == Photo::"VacationPhoto94.jpg"
///     );
/// "#)?;
///
/// let request = EvalRequest::new(
///     r#"User::"alice""#,
///     r#"Action::"update""#,
///     r#"Photo::"VacationPhoto94.jpg""#,
/// );
/// assert!(engine.is_authorized_json(&request)?);
/// # Ok::<(), warden::EngineError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Engine {
    current: Arc<RwLock<Arc<Snapshot>>>,
    authorizer: Authorizer,
    max_nesting_depth: usize,
    audit: bool,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Creates an engine with default settings and nothing loaded.
    pub fn new() -> Self {
        Self::with_config(&WardenConfig::default())
    }

    /// Creates an engine from a loaded configuration.
    pub fn with_config(config: &WardenConfig) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(Snapshot::default()))),
            authorizer: Authorizer::new().with_parallel_threshold(config.engine.parallel_threshold),
            max_nesting_depth: config.parser.max_nesting_depth,
            audit: config.engine.audit,
        }
    }

    /// Disables per-decision audit logging.
    pub fn without_audit(mut self) -> Self {
        self.audit = false;
        self
    }

    // ------------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------------

    /// Parses `text` and replaces the active policies.
    ///
    /// All-or-nothing: on error the previous policies stay active.
    pub fn set_policies(&self, text: &str) -> Result<()> {
        let policies = match PolicySet::parse_with_depth(text, self.max_nesting_depth) {
            Ok(policies) => policies,
            Err(err) => {
                warn!(error = %err, "Policy load failed; keeping previous snapshot");
                return Err(err.into());
            }
        };
        self.set_policy_set(policies)
    }

    /// Replaces the active policies with an already-built set.
    pub fn set_policy_set(&self, policies: PolicySet) -> Result<()> {
        let policies = Arc::new(policies);
        self.publish(|current| Snapshot {
            version: current.version + 1,
            policies: Some(policies),
            entities: current.entities.clone(),
        })
    }

    /// Builds an entity store from `records` and replaces the active entities.
    pub fn set_entities(&self, records: impl IntoIterator<Item = Entity>) -> Result<()> {
        let store = match EntityStore::load(records) {
            Ok(store) => store,
            Err(err) => {
                warn!(error = %err, "Entity load failed; keeping previous snapshot");
                return Err(err.into());
            }
        };
        let entities = Arc::new(store);
        self.publish(|current| Snapshot {
            version: current.version + 1,
            policies: current.policies.clone(),
            entities: Some(entities),
        })
    }

    /// Decodes an entity JSON array and replaces the active entities.
    pub fn set_entities_from_json(&self, text: &str) -> Result<()> {
        let records = match entities_from_json(text) {
            Ok(records) => records,
            Err(err) => {
                warn!(error = %err, "Entity JSON rejected; keeping previous snapshot");
                return Err(err);
            }
        };
        self.set_entities(records)
    }

    fn publish(&self, next: impl FnOnce(&Snapshot) -> Snapshot) -> Result<()> {
        let mut current = self
            .current
            .write()
            .map_err(|_| EngineError::internal("lock poisoned"))?;
        let snapshot = Arc::new(next(&**current));
        info!(
            version = snapshot.version,
            policies = snapshot.policies().map_or(0, PolicySet::len),
            entities = snapshot.entities().map_or(0, EntityStore::len),
            "Snapshot published"
        );
        *current = snapshot;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------------

    /// Returns the active snapshot, pinned for as long as the caller holds it.
    pub fn snapshot(&self) -> Result<Arc<Snapshot>> {
        let current = self
            .current
            .read()
            .map_err(|_| EngineError::internal("lock poisoned"))?;
        Ok(Arc::clone(&*current))
    }

    /// Evaluates `request` against the active snapshot.
    pub fn evaluate(&self, request: &Request) -> Result<EvaluationResponse> {
        let snapshot = self.snapshot()?;
        self.evaluate_in(&snapshot, request)
    }

    /// Evaluates `request` against a pinned snapshot.
    pub fn evaluate_in(&self, snapshot: &Snapshot, request: &Request) -> Result<EvaluationResponse> {
        let (policies, entities) = snapshot.loaded()?;
        let response = self.authorizer.is_authorized(policies, entities, request);
        self.audit(request, &response);
        Ok(response)
    }

    /// Evaluates `request`, checking `cancel` before each policy.
    ///
    /// Returns [`EngineError::Cancelled`] rather than a partial response.
    pub fn evaluate_with_cancel(
        &self,
        request: &Request,
        cancel: &AtomicBool,
    ) -> Result<EvaluationResponse> {
        let snapshot = self.snapshot()?;
        let (policies, entities) = snapshot.loaded()?;
        let response = self
            .authorizer
            .is_authorized_with_cancel(policies, entities, request, cancel)
            .map_err(|_| EngineError::Cancelled)?;
        self.audit(request, &response);
        Ok(response)
    }

    /// Returns true when `request` is allowed.
    pub fn is_authorized(&self, request: &Request) -> Result<bool> {
        Ok(self.evaluate(request)?.is_allowed())
    }

    /// Decodes a wire-form request and evaluates it.
    pub fn evaluate_json_request(&self, request: &EvalRequest) -> Result<EvaluationResponse> {
        self.evaluate(&request.to_request()?)
    }

    /// Decodes a wire-form request and returns true when it is allowed.
    pub fn is_authorized_json(&self, request: &EvalRequest) -> Result<bool> {
        Ok(self.evaluate_json_request(request)?.is_allowed())
    }

    fn audit(&self, request: &Request, response: &EvaluationResponse) {
        if !self.audit {
            return;
        }
        let reasons: Vec<&str> = response.reasons().iter().map(|id| id.as_str()).collect();
        if response.is_allowed() {
            info!(
                principal = %request.principal,
                action = %request.action,
                resource = %request.resource,
                reasons = ?reasons,
                "Access allowed"
            );
        } else {
            warn!(
                principal = %request.principal,
                action = %request.action,
                resource = %request.resource,
                reasons = ?reasons,
                errors = response.errors().len(),
                "Access denied"
            );
        }
    }
}
