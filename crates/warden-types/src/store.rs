//! The loaded entity graph and its ancestry relation.
//!
//! Entities live in an arena indexed by position; parent edges are stored as
//! arena indices. Ancestor closures are computed on first use with an explicit
//! visited-set BFS and memoized per entity, so cyclic parent graphs terminate
//! and repeated `in` checks against the same entity are cheap.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::OnceLock;

use thiserror::Error;
use tracing::debug;

use crate::entity::Entity;
use crate::uid::EntityUid;
use crate::value::Value;

/// Error type for entity store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The same UID appeared more than once in the input.
    #[error("duplicate entity {uid}")]
    DuplicateEntity { uid: EntityUid },

    /// The requested entity is not in the store.
    #[error("entity {uid} does not exist")]
    EntityNotFound { uid: EntityUid },

    /// An attribute path did not resolve.
    #[error("entity {uid} has no attribute `{path}`")]
    AttributeNotFound { uid: EntityUid, path: String },
}

/// Result type for entity store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Immutable store of entities keyed by UID.
#[derive(Debug, Default)]
pub struct EntityStore {
    entities: Vec<Entity>,
    index: HashMap<EntityUid, usize>,
    /// Parent edges by arena index. Parents absent from the store are omitted.
    parents: Vec<Vec<usize>>,
    /// Memoized strict-ancestor closure per arena index, sorted.
    closures: Vec<OnceLock<Box<[usize]>>>,
}

impl EntityStore {
    /// Returns a store with no entities.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a store from entity records.
    ///
    /// Fails with [`StoreError::DuplicateEntity`] if a UID repeats. Parent
    /// references to UIDs not in the input are accepted; hierarchy checks
    /// against them never match.
    pub fn load(records: impl IntoIterator<Item = Entity>) -> Result<Self> {
        let mut entities = Vec::new();
        let mut index = HashMap::new();

        for entity in records {
            if index.contains_key(entity.uid()) {
                return Err(StoreError::DuplicateEntity {
                    uid: entity.uid().clone(),
                });
            }
            index.insert(entity.uid().clone(), entities.len());
            entities.push(entity);
        }

        let mut dangling = 0usize;
        let parents: Vec<Vec<usize>> = entities
            .iter()
            .map(|entity| {
                entity
                    .parents()
                    .iter()
                    .filter_map(|p| {
                        let idx = index.get(p).copied();
                        if idx.is_none() {
                            dangling += 1;
                        }
                        idx
                    })
                    .collect()
            })
            .collect();

        let closures = entities.iter().map(|_| OnceLock::new()).collect();

        debug!(
            entities = entities.len(),
            dangling_parents = dangling,
            "Entity store loaded"
        );

        Ok(Self {
            entities,
            index,
            parents,
            closures,
        })
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Returns the entity with the given UID.
    pub fn get(&self, uid: &EntityUid) -> Option<&Entity> {
        self.index.get(uid).map(|&idx| &self.entities[idx])
    }

    /// Iterates entities in load order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }

    /// Returns true if `candidate` is `uid` itself or one of its ancestors.
    ///
    /// The relation is the reflexive-transitive closure of the parent edges.
    pub fn is_ancestor(&self, candidate: &EntityUid, uid: &EntityUid) -> bool {
        if candidate == uid {
            return true;
        }
        let (Some(&child), Some(&ancestor)) = (self.index.get(uid), self.index.get(candidate))
        else {
            return false;
        };
        self.closure(child).binary_search(&ancestor).is_ok()
    }

    /// Returns the strict ancestors of `uid` that are present in the store, sorted by UID.
    pub fn ancestors(&self, uid: &EntityUid) -> Vec<&EntityUid> {
        let Some(&idx) = self.index.get(uid) else {
            return Vec::new();
        };
        let mut out: Vec<&EntityUid> = self
            .closure(idx)
            .iter()
            .filter(|&&a| a != idx)
            .map(|&a| self.entities[a].uid())
            .collect();
        out.sort();
        out
    }

    /// Resolves an attribute path on an entity, descending through records.
    pub fn get_attribute(&self, uid: &EntityUid, path: &[&str]) -> Result<&Value> {
        let entity = self.get(uid).ok_or_else(|| StoreError::EntityNotFound {
            uid: uid.clone(),
        })?;
        let not_found = || StoreError::AttributeNotFound {
            uid: uid.clone(),
            path: path.join("."),
        };

        let (first, rest) = path.split_first().ok_or_else(not_found)?;
        let mut current = entity.attr(first).ok_or_else(not_found)?;
        for segment in rest {
            current = current
                .as_record()
                .and_then(|fields| fields.get(*segment))
                .ok_or_else(not_found)?;
        }
        Ok(current)
    }

    fn closure(&self, idx: usize) -> &[usize] {
        self.closures[idx].get_or_init(|| {
            let mut visited = HashSet::new();
            let mut queue: VecDeque<usize> = self.parents[idx].iter().copied().collect();
            while let Some(next) = queue.pop_front() {
                if visited.insert(next) {
                    queue.extend(self.parents[next].iter().copied());
                }
            }
            let mut sorted: Vec<usize> = visited.into_iter().collect();
            sorted.sort_unstable();
            sorted.into_boxed_slice()
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
