//! Checker configuration
//!
//! [`CheckerConfig`] tunes evaluation. [`PermissionsConfig`] is the file
//! format used by hosts that declare their permission types as CEL
//! expressions instead of registering Rust closures:
//!
//! ```json
//! {
//!   "max_depth": 32,
//!   "types": {
//!     "role": "permission in user.roles",
//!     "flag": "context.flags[permission] == true"
//!   },
//!   "bypass": "user.superuser == true"
//! }
//! ```

use crate::error::{PermissionError, Result};
use crate::evaluator::DEFAULT_MAX_DEPTH;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Evaluation settings for an [`AccessChecker`](crate::AccessChecker)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckerConfig {
    /// Deepest nesting a single tree may reach before evaluation aborts
    pub max_depth: usize,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Declarative permission setup loaded from JSON
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PermissionsConfig {
    /// Recursion limit; engine default when absent
    pub max_depth: Option<usize>,

    /// Permission type name → CEL expression, in registration order
    pub types: IndexMap<String, String>,

    /// CEL expression granting bypass access
    pub bypass: Option<String>,
}

impl PermissionsConfig {
    /// Parse a configuration document
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and parse a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading permissions config from {}", path.display());
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Reject settings the checker cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.max_depth == Some(0) {
            return Err(PermissionError::Config(
                "max_depth must be at least 1".to_string(),
            ));
        }
        for (name, expression) in &self.types {
            if expression.trim().is_empty() {
                return Err(PermissionError::Config(format!(
                    "The expression for permission type \"{}\" is empty",
                    name
                )));
            }
        }
        if matches!(&self.bypass, Some(expr) if expr.trim().is_empty()) {
            return Err(PermissionError::Config(
                "The bypass expression is empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Evaluation settings derived from this file
    pub fn checker_config(&self) -> CheckerConfig {
        CheckerConfig {
            max_depth: self.max_depth.unwrap_or(DEFAULT_MAX_DEPTH),
        }
    }
}
