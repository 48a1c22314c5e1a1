//! Core permission tree types

use crate::error::{PermissionError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Opaque caller context, forwarded untouched to every callback
pub type Context = Value;

/// Root-only key controlling bypass for a single check
pub const NO_BYPASS_KEY: &str = "no_bypass";

/// Literal grant token
pub const TRUE_LITERAL: &str = "TRUE";

/// Literal deny token
pub const FALSE_LITERAL: &str = "FALSE";

/// Keys with engine-defined meaning, in canonical order
pub const RESERVED_KEYS: [&str; 9] = [
    NO_BYPASS_KEY,
    "AND",
    "NAND",
    "OR",
    "NOR",
    "XOR",
    "NOT",
    TRUE_LITERAL,
    FALSE_LITERAL,
];

/// Whether `name` is one of the reserved keywords
pub fn is_reserved(name: &str) -> bool {
    RESERVED_KEYS.contains(&name)
}

/// Whether an object key is an array index in disguise (`"0"`, `"12"`, `"1.5"`)
pub fn is_numeric_key(key: &str) -> bool {
    key.trim()
        .parse::<f64>()
        .map(|n| n.is_finite())
        .unwrap_or(false)
}

/// Boolean combinator over child nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicGate {
    And,
    Nand,
    Or,
    Nor,
    Xor,
    Not,
}

impl LogicGate {
    /// All gates in canonical order
    pub const ALL: [LogicGate; 6] = [
        LogicGate::And,
        LogicGate::Nand,
        LogicGate::Or,
        LogicGate::Nor,
        LogicGate::Xor,
        LogicGate::Not,
    ];

    /// Tree key for this gate
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Nand => "NAND",
            Self::Or => "OR",
            Self::Nor => "NOR",
            Self::Xor => "XOR",
            Self::Not => "NOT",
        }
    }

    /// Parse a mapping key, case-sensitive
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|gate| gate.as_str() == key)
    }

    /// Minimum operand count of a collection-valued gate
    pub fn min_operands(&self) -> usize {
        match self {
            Self::Xor => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for LogicGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogicGate {
    type Err = PermissionError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_key(s).ok_or_else(|| {
            PermissionError::InvalidArgumentValue(format!("\"{}\" is not a logic gate", s))
        })
    }
}

/// A node of a permission tree
///
/// Decoded once from JSON (or built directly) so the evaluator dispatches on
/// a closed set of shapes. Mapping entries keep declaration order, which is
/// the short-circuit order.
#[derive(Debug, Clone, PartialEq)]
pub enum PermissionNode {
    /// Unconditional grant or deny
    Bool(bool),
    /// `TRUE`/`FALSE` literal, or a permission value under a type scope
    String(String),
    /// Shorthand OR
    Sequence(Vec<PermissionNode>),
    /// Gate, type scope or shorthand OR over entries
    Mapping(Vec<(String, PermissionNode)>),
}

impl PermissionNode {
    /// Single-entry mapping `{key: value}`
    pub fn entry(key: impl Into<String>, value: impl Into<PermissionNode>) -> Self {
        Self::Mapping(vec![(key.into(), value.into())])
    }

    /// Decode a JSON value into an owned tree
    ///
    /// Objects keyed by array indices are unwrapped here. Such an object
    /// decodes to a sequence holding each indexed value, plus a singleton
    /// mapping for each named key, so `{"0": X}` becomes `[X]`. A gate then
    /// counts one operand per key, as it would for the object.
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(Self::Bool(*b)),
            Value::String(s) => Ok(Self::String(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(Self::from_json)
                .collect::<Result<Vec<_>>>()
                .map(Self::Sequence),
            Value::Object(map) => Self::from_json_object(map),
            Value::Null | Value::Number(_) => Err(PermissionError::InvalidArgumentType(format!(
                "A permission value must either be a boolean, a string, an array or an object. Evaluated permissions: {}",
                value
            ))),
        }
    }

    fn from_json_object(map: &Map<String, Value>) -> Result<Self> {
        if !map.keys().any(|key| is_numeric_key(key)) {
            let entries = map
                .iter()
                .map(|(key, value)| Ok((key.clone(), Self::from_json(value)?)))
                .collect::<Result<Vec<_>>>()?;
            return Ok(Self::Mapping(entries));
        }

        let items = map
            .iter()
            .map(|(key, value)| {
                let node = Self::from_json(value)?;
                Ok(if is_numeric_key(key) {
                    node
                } else {
                    Self::Mapping(vec![(key.clone(), node)])
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::Sequence(items))
    }

    /// Encode back to JSON
    pub fn to_json(&self) -> Value {
        match self {
            Self::Bool(b) => Value::Bool(*b),
            Self::String(s) => Value::String(s.clone()),
            Self::Sequence(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Mapping(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for PermissionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl From<bool> for PermissionNode {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for PermissionNode {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for PermissionNode {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Vec<PermissionNode>> for PermissionNode {
    fn from(items: Vec<PermissionNode>) -> Self {
        Self::Sequence(items)
    }
}

impl TryFrom<&Value> for PermissionNode {
    type Error = PermissionError;

    fn try_from(value: &Value) -> Result<Self> {
        Self::from_json(value)
    }
}

impl TryFrom<Value> for PermissionNode {
    type Error = PermissionError;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_json(&value)
    }
}

impl Serialize for PermissionNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PermissionNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(&value).map_err(serde::de::Error::custom)
    }
}
