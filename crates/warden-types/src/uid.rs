//! Entity type names and unique identifiers.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

// ============================================================================
// Entity Type
// ============================================================================

/// The type component of an entity UID, e.g. `User` or `Photos::Album`.
///
/// Namespaced types keep their `::` separators verbatim.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityType(String);

impl EntityType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityType {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EntityType {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ============================================================================
// Entity UID
// ============================================================================

/// Unique identifier of an entity: a `(type, id)` pair.
///
/// Ordering is by type first, then id, which keeps diagnostics deterministic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityUid {
    #[serde(rename = "type")]
    ty: EntityType,
    id: String,
}

impl EntityUid {
    pub fn new(ty: impl Into<EntityType>, id: impl Into<String>) -> Self {
        Self {
            ty: ty.into(),
            id: id.into(),
        }
    }

    /// Returns the type component.
    pub fn entity_type(&self) -> &EntityType {
        &self.ty
    }

    /// Returns the id component.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Display for EntityUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::\"{}\"", self.ty, escape_str(&self.id))
    }
}

/// Escapes a string for display inside double quotes.
pub(crate) fn escape_str(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            other => out.push(other),
        }
    }
    out
}
