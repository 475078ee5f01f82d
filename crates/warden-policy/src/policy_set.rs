//! An ordered, validated collection of policies.

use std::collections::HashSet;
use std::str::FromStr;

use crate::ast::{Policy, PolicyId};
use crate::error::PolicySetError;
use crate::parser::parse_policies_with_depth;
use crate::parser::DEFAULT_MAX_NESTING_DEPTH;

/// Policies in source order.
///
/// Ids are `policy0..policyN` by position. Explicit `@id` names are unique
/// and never shadow another policy's generated id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicySet {
    policies: Vec<Policy>,
}

impl PolicySet {
    /// Creates an empty set. Evaluating against it always denies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from already-parsed policies, validating id uniqueness.
    pub fn from_policies(policies: Vec<Policy>) -> Result<Self, PolicySetError> {
        let mut ids: HashSet<&str> = HashSet::with_capacity(policies.len());
        for policy in &policies {
            if !ids.insert(policy.id().as_str()) {
                return Err(PolicySetError::DuplicatePolicyId {
                    id: policy.id().to_string(),
                });
            }
        }

        let mut names: HashSet<&str> = HashSet::new();
        for policy in &policies {
            let Some(name) = policy.name() else {
                continue;
            };
            let shadows_other = name != policy.id().as_str() && ids.contains(name);
            if shadows_other || !names.insert(name) {
                return Err(PolicySetError::DuplicatePolicyId {
                    id: name.to_string(),
                });
            }
        }

        Ok(Self { policies })
    }

    /// Parses policy text with an explicit nesting bound.
    pub fn parse_with_depth(text: &str, max_depth: usize) -> Result<Self, PolicySetError> {
        Self::from_policies(parse_policies_with_depth(text, max_depth)?)
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Policies in source order.
    pub fn policies(&self) -> &[Policy] {
        &self.policies
    }

    pub fn iter(&self) -> impl Iterator<Item = &Policy> {
        self.policies.iter()
    }

    pub fn get(&self, id: &PolicyId) -> Option<&Policy> {
        self.policies.iter().find(|p| p.id() == id)
    }

    /// Looks up a policy by its `@id` name.
    pub fn by_name(&self, name: &str) -> Option<&Policy> {
        self.policies.iter().find(|p| p.name() == Some(name))
    }
}

impl FromStr for PolicySet {
    type Err = PolicySetError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Self::parse_with_depth(text, DEFAULT_MAX_NESTING_DEPTH)
    }
}
