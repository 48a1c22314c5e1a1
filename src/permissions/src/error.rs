//! Error types for the permission engine

use crate::cel::CelError;
use crate::types::LogicGate;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Which host callback broke its contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackSource {
    /// Callback registered for a permission type
    PermissionType(String),
    /// Global bypass callback
    Bypass,
}

impl fmt::Display for CallbackSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PermissionType(name) => {
                write!(f, "the registered callback for the permission type \"{}\"", name)
            }
            Self::Bypass => write!(f, "the bypass access callback"),
        }
    }
}

/// Permission engine errors
///
/// Every variant aborts the whole `check_access` call. Nothing is retried or
/// recovered locally: they are all caller-input or callback-contract errors.
#[derive(Debug, Error)]
pub enum PermissionError {
    /// A required argument was absent
    #[error("Missing argument: {0}")]
    MissingArgument(String),

    /// An argument had the wrong shape
    #[error("Invalid argument type: {0}")]
    InvalidArgumentType(String),

    /// An argument had the right shape but an illegal value
    #[error("Invalid argument value: {0}")]
    InvalidArgumentValue(String),

    /// Lookup of a type that was never registered
    #[error(
        "The permission type \"{0}\" has not been registered. Use add_type() or set_types() to register permission types."
    )]
    PermissionTypeNotRegistered(String),

    /// Registration of a name that is already taken
    #[error(
        "The permission type \"{0}\" already exists. Use set_type_callback() to change the callback of an existing type."
    )]
    PermissionTypeAlreadyExists(String),

    /// A logic gate value with the wrong shape or arity
    #[error("Invalid value for {gate} gate: {message}. Current value: {value}")]
    InvalidLogicGateValue {
        gate: LogicGate,
        message: String,
        value: String,
    },

    /// A host callback returned something other than a boolean
    #[error("Invalid callback return type: {source_name} must return a boolean, got {returned}")]
    InvalidCallbackReturnType {
        source_name: CallbackSource,
        returned: Value,
    },

    /// A host callback reported its own failure
    #[error("Callback failed: {source_name}: {source}")]
    CallbackFailed {
        source_name: CallbackSource,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Permission tree nested deeper than the configured limit
    #[error("Permission tree exceeds the maximum depth of {limit}")]
    TreeTooDeep { limit: usize },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// CEL compilation error while building expression-backed types
    #[error("CEL error: {0}")]
    Cel(#[from] CelError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PermissionError {
    pub(crate) fn gate_value(gate: LogicGate, message: impl Into<String>, value: impl fmt::Display) -> Self {
        Self::InvalidLogicGateValue {
            gate,
            message: message.into(),
            value: value.to_string(),
        }
    }
}

/// Result type for permission operations
pub type Result<T> = std::result::Result<T, PermissionError>;
