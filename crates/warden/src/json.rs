//! JSON decoding for entity sets and requests.
//!
//! Entity JSON is an array of records:
//!
//! ```json
//! [
//!   {
//!     "uid": { "type": "User", "id": "alice" },
//!     "attrs": { "age": 30, "manager": { "__entity": { "type": "User", "id": "bob" } } },
//!     "parents": [ { "type": "Group", "id": "admins" } ]
//!   }
//! ]
//! ```
//!
//! A UID may be written as `{"type", "id"}`, `{"__entity": {"type", "id"}}`,
//! or the string `Type::"id"`. Attribute values map booleans, integers,
//! strings, arrays, and objects onto [`Value`]; floats and `null` are rejected.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use warden_policy::{Request, parse_entity_uid};
use warden_types::{Entity, EntityUid, Value};

use crate::error::{EngineError, Result};

const ENTITY_ESCAPE: &str = "__entity";
const EXTENSION_ESCAPE: &str = "__extn";

// ============================================================================
// Entities
// ============================================================================

/// Decodes an entity JSON array into entity records, in input order.
pub fn entities_from_json(text: &str) -> Result<Vec<Entity>> {
    let json: Json = serde_json::from_str(text)?;
    let Json::Array(records) = json else {
        return Err(EngineError::json("entity set must be a JSON array"));
    };
    records.iter().map(entity_from_json).collect()
}

fn entity_from_json(json: &Json) -> Result<Entity> {
    let Json::Object(fields) = json else {
        return Err(EngineError::json("entity record must be a JSON object"));
    };

    let uid = uid_from_json(
        fields
            .get("uid")
            .ok_or_else(|| EngineError::json("entity record is missing `uid`"))?,
    )?;

    let attrs = match fields.get("attrs") {
        None | Some(Json::Null) => BTreeMap::new(),
        Some(Json::Object(attrs)) => record_from_json(attrs)?,
        Some(_) => return Err(EngineError::json(format!("`attrs` of {uid} must be an object"))),
    };

    let parents = match fields.get("parents") {
        None | Some(Json::Null) => BTreeSet::new(),
        Some(Json::Array(parents)) => parents
            .iter()
            .map(uid_from_json)
            .collect::<Result<BTreeSet<_>>>()?,
        Some(_) => return Err(EngineError::json(format!("`parents` of {uid} must be an array"))),
    };

    Ok(Entity::from_parts(uid, attrs, parents))
}

/// Decodes a UID in any of the accepted shapes.
pub fn uid_from_json(json: &Json) -> Result<EntityUid> {
    match json {
        Json::String(text) => parse_uid(text),
        Json::Object(fields) => {
            if let Some(inner) = fields.get(ENTITY_ESCAPE) {
                return uid_from_json(inner);
            }
            let ty = fields.get("type").and_then(Json::as_str);
            let id = fields.get("id").and_then(Json::as_str);
            match (ty, id) {
                (Some(ty), Some(id)) => Ok(EntityUid::new(ty, id)),
                _ => Err(EngineError::json(format!(
                    "entity uid needs string `type` and `id`, got {json}"
                ))),
            }
        }
        other => Err(EngineError::json(format!("invalid entity uid {other}"))),
    }
}

/// Parses a UID written as `Type::"id"`.
pub fn parse_uid(text: &str) -> Result<EntityUid> {
    parse_entity_uid(text).map_err(|_| EngineError::InvalidUid {
        input: text.to_string(),
    })
}

fn record_from_json(fields: &Map<String, Json>) -> Result<BTreeMap<String, Value>> {
    fields
        .iter()
        .map(|(key, value)| Ok((key.clone(), value_from_json(value)?)))
        .collect()
}

/// Converts a JSON attribute value into a [`Value`].
pub fn value_from_json(json: &Json) -> Result<Value> {
    match json {
        Json::Bool(b) => Ok(Value::Bool(*b)),
        Json::Number(n) => n
            .as_i64()
            .map(Value::Long)
            .ok_or_else(|| EngineError::json(format!("number {n} is not a 64-bit integer"))),
        Json::String(s) => Ok(Value::String(s.clone())),
        Json::Array(items) => items
            .iter()
            .map(value_from_json)
            .collect::<Result<BTreeSet<_>>>()
            .map(Value::Set),
        Json::Object(fields) => {
            if let Some(inner) = fields.get(ENTITY_ESCAPE) {
                return uid_from_json(inner).map(Value::EntityRef);
            }
            if fields.contains_key(EXTENSION_ESCAPE) {
                return Err(EngineError::json("extension values are not supported"));
            }
            record_from_json(fields).map(Value::Record)
        }
        Json::Null => Err(EngineError::json("null is not a valid attribute value")),
    }
}

// ============================================================================
// Requests
// ============================================================================

/// A request in host wire form: UIDs as `Type::"id"` strings and the
/// context as a JSON object encoded in a string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalRequest {
    pub principal: String,
    pub action: String,
    pub resource: String,
    /// JSON object text. Empty means no context.
    #[serde(default)]
    pub context: String,
}

impl EvalRequest {
    pub fn new(
        principal: impl Into<String>,
        action: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            principal: principal.into(),
            action: action.into(),
            resource: resource.into(),
            context: String::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Decodes the UIDs and context into a [`Request`].
    pub fn to_request(&self) -> Result<Request> {
        let context = if self.context.trim().is_empty() {
            BTreeMap::new()
        } else {
            match serde_json::from_str::<Json>(&self.context)? {
                Json::Object(fields) => record_from_json(&fields)?,
                Json::Null => BTreeMap::new(),
                _ => return Err(EngineError::json("request context must be a JSON object")),
            }
        };

        Ok(Request::new(
            parse_uid(&self.principal)?,
            parse_uid(&self.action)?,
            parse_uid(&self.resource)?,
        )
        .with_context(context))
    }
}
