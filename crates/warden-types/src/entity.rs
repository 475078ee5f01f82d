//! Entities: a UID, its attributes, and its declared parents.

use std::collections::{BTreeMap, BTreeSet};

use crate::uid::EntityUid;
use crate::value::Value;

/// A single entity record.
///
/// Entities refer to each other only by UID. The hierarchy is derived by the
/// [`EntityStore`](crate::EntityStore), never stored as pointers here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    uid: EntityUid,
    attrs: BTreeMap<String, Value>,
    parents: BTreeSet<EntityUid>,
}

impl Entity {
    /// Creates an entity with no attributes and no parents.
    pub fn new(uid: EntityUid) -> Self {
        Self {
            uid,
            attrs: BTreeMap::new(),
            parents: BTreeSet::new(),
        }
    }

    /// Creates an entity from its parts.
    pub fn from_parts(
        uid: EntityUid,
        attrs: BTreeMap<String, Value>,
        parents: impl IntoIterator<Item = EntityUid>,
    ) -> Self {
        Self {
            uid,
            attrs,
            parents: parents.into_iter().collect(),
        }
    }

    /// Sets an attribute (builder pattern).
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    /// Adds a parent (builder pattern).
    pub fn with_parent(mut self, parent: EntityUid) -> Self {
        self.parents.insert(parent);
        self
    }

    pub fn uid(&self) -> &EntityUid {
        &self.uid
    }

    /// Returns the named attribute, if present.
    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.attrs.get(name)
    }

    pub fn attrs(&self) -> &BTreeMap<String, Value> {
        &self.attrs
    }

    /// Returns the declared parents, including ones absent from any store.
    pub fn parents(&self) -> &BTreeSet<EntityUid> {
        &self.parents
    }
}
