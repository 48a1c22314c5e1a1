//! JSON ⇄ CEL value mapping for permission expressions
//!
//! Contexts arrive as JSON and expression results leave as JSON, so the
//! engine can report a non-boolean result verbatim.

use cel_interpreter::objects::{Key, Map, Value as CelValue};
use serde_json::{Number, Value as JsonValue};
use std::collections::HashMap;
use std::sync::Arc;

/// Expose a JSON value to an expression
pub fn to_cel(value: &JsonValue) -> CelValue {
    match value {
        JsonValue::Null => CelValue::Null,
        JsonValue::Bool(b) => CelValue::Bool(*b),
        JsonValue::Number(n) => number_to_cel(n),
        JsonValue::String(s) => CelValue::String(s.clone().into()),
        JsonValue::Array(items) => CelValue::List(items.iter().map(to_cel).collect::<Vec<_>>().into()),
        JsonValue::Object(fields) => {
            let map: HashMap<Key, CelValue> = fields
                .iter()
                .map(|(name, field)| (Key::from(name.clone()), to_cel(field)))
                .collect();
            CelValue::Map(Map { map: Arc::new(map) })
        }
    }
}

fn number_to_cel(n: &Number) -> CelValue {
    n.as_i64()
        .map(CelValue::Int)
        .or_else(|| n.as_u64().map(CelValue::UInt))
        .or_else(|| n.as_f64().map(CelValue::Float))
        .unwrap_or(CelValue::Null)
}

/// Bring an expression result back as JSON
///
/// Durations, timestamps and functions have no JSON form and come back as
/// their debug text.
pub fn to_json(value: &CelValue) -> JsonValue {
    match value {
        CelValue::Null => JsonValue::Null,
        CelValue::Bool(b) => JsonValue::Bool(*b),
        CelValue::Int(i) => JsonValue::from(*i),
        CelValue::UInt(u) => JsonValue::from(*u),
        CelValue::Float(f) => Number::from_f64(*f).map_or(JsonValue::Null, JsonValue::Number),
        CelValue::String(s) => JsonValue::String(s.to_string()),
        CelValue::Bytes(bytes) => bytes.iter().map(|byte| JsonValue::from(*byte)).collect(),
        CelValue::List(items) => items.iter().map(to_json).collect(),
        CelValue::Map(map) => JsonValue::Object(
            map.map
                .iter()
                .map(|(key, item)| (key_to_string(key), to_json(item)))
                .collect(),
        ),
        other => JsonValue::String(format!("{:?}", other)),
    }
}

fn key_to_string(key: &Key) -> String {
    match key {
        Key::String(s) => s.to_string(),
        Key::Int(i) => i.to_string(),
        Key::Uint(u) => u.to_string(),
        Key::Bool(b) => b.to_string(),
    }
}
