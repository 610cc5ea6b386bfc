//! Shadow document model and JSON merge/diff helpers.
//!
//! A shadow document carries a `state` object with `reported` and
//! `desired` sections, a server-assigned `version`, a `timestamp`, and
//! an echoed `clientToken` for request/response correlation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The `state` object of a shadow document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowState {
    #[serde(default = "empty_object")]
    pub reported: Value,
    #[serde(default = "empty_object")]
    pub desired: Value,
}

impl Default for ShadowState {
    fn default() -> Self {
        Self {
            reported: empty_object(),
            desired: empty_object(),
        }
    }
}

/// A full shadow document as exchanged with the broker.
///
/// Request payloads omit `version`; response payloads carry it and echo
/// the `clientToken` (delta pushes carry neither token nor full state).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShadowDocument {
    #[serde(default)]
    pub state: ShadowState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(
        rename = "clientToken",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub client_token: Option<String>,
}

impl ShadowDocument {
    /// An empty shadow document skeleton:
    /// `{"state":{"reported":{},"desired":{}}}`.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// A delta push payload. Its `state` holds the delta fields directly,
/// not a `reported`/`desired` pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeltaDocument {
    #[serde(default = "empty_object")]
    pub state: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

pub fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// Whether a value is an object with no fields (or not an object at all).
pub fn object_is_empty(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Merge `patch` into `target`, field by field.
///
/// A key present in both takes the patch value; a key present only in
/// `target` is kept; a key present only in `patch` is added. Nested
/// objects merge recursively; any other value is replaced wholesale.
pub fn merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                match target_map.get_mut(key) {
                    Some(existing) => merge(existing, patch_value),
                    None => {
                        target_map.insert(key.clone(), patch_value.clone());
                    }
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

/// Shallow diff: the fields of `current` whose values differ from (or
/// are absent in) `base`. Fields only in `base` are omitted.
pub fn diff(current: &Value, base: &Value) -> Value {
    let mut out = Map::new();
    if let Some(current_map) = current.as_object() {
        let base_map = base.as_object();
        for (key, value) in current_map {
            if base_map.and_then(|m| m.get(key)) != Some(value) {
                out.insert(key.clone(), value.clone());
            }
        }
    }
    Value::Object(out)
}
