//! Runtime values.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display};

use crate::uid::{EntityUid, escape_str};

/// A runtime value produced by evaluation or stored as an entity attribute.
///
/// Equality is structural and never coerces across variants: `Long(1)` is not
/// equal to `String("1")`. Sets and records are ordered collections so that
/// equality, hashing, and display are independent of insertion order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Value {
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Long(i64),
    /// UTF-8 string.
    String(String),
    /// Set of values (duplicates collapse).
    Set(BTreeSet<Value>),
    /// Record mapping attribute names to values.
    Record(BTreeMap<String, Value>),
    /// Reference to an entity by UID.
    EntityRef(EntityUid),
}

impl Value {
    /// Builds a set value from any iterator of values.
    pub fn set(values: impl IntoIterator<Item = Value>) -> Self {
        Value::Set(values.into_iter().collect())
    }

    /// Builds a record value from `(name, value)` pairs. Later duplicates win.
    pub fn record<K: Into<String>>(fields: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Record(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Returns the empty record.
    pub fn empty_record() -> Self {
        Value::Record(BTreeMap::new())
    }

    /// Human-readable name of this value's variant, used in type errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Long(_) => "long",
            Value::String(_) => "string",
            Value::Set(_) => "set",
            Value::Record(_) => "record",
            Value::EntityRef(_) => "entity",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&BTreeSet<Value>> {
        match self {
            Value::Set(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&EntityUid> {
        match self {
            Value::EntityRef(uid) => Some(uid),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Long(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<EntityUid> for Value {
    fn from(value: EntityUid) -> Self {
        Value::EntityRef(value)
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Long(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "\"{}\"", escape_str(s)),
            Value::Set(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Record(fields) => {
                f.write_str("{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "\"{}\": {value}", escape_str(name))?;
                }
                f.write_str("}")
            }
            Value::EntityRef(uid) => write!(f, "{uid}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_cross_variant_equality() {
        assert_ne!(Value::Long(1), Value::from("1"));
        assert_ne!(Value::Bool(true), Value::Long(1));
    }

    #[test]
    fn test_set_equality_ignores_order_and_duplicates() {
        let a = Value::set([Value::Long(1), Value::Long(2), Value::Long(2)]);
        let b = Value::set([Value::Long(2), Value::Long(1)]);
        assert_eq!(a, b);
        assert_eq!(a.as_set().map(BTreeSet::len), Some(2));
    }

    #[test]
    fn test_record_later_duplicate_wins() {
        let r = Value::record([("a", Value::Long(1)), ("a", Value::Long(2))]);
        assert_eq!(r.as_record().and_then(|m| m.get("a")), Some(&Value::Long(2)));
    }

    #[test]
    fn test_display() {
        let v = Value::record([
            ("name", Value::from("al\"ice")),
            ("owner", Value::from(EntityUid::new("User", "bob"))),
            ("tags", Value::set([Value::Long(2), Value::Bool(false)])),
        ]);
        assert_eq!(
            v.to_string(),
            r#"{"name": "al\"ice", "owner": User::"bob", "tags": [false, 2]}"#
        );
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Value::Bool(true).type_name(), "bool");
        assert_eq!(Value::empty_record().type_name(), "record");
        assert_eq!(Value::from(EntityUid::new("A", "b")).type_name(), "entity");
    }
}
