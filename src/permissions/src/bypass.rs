//! Global access bypass

use crate::callback::BypassCallback;
use crate::error::{CallbackSource, PermissionError, Result};
use crate::types::Context;
use serde_json::Value;
use std::fmt;
use tracing::debug;

/// Holds at most one callback that may grant access unconditionally
#[derive(Clone, Default)]
pub struct BypassResolver {
    callback: Option<BypassCallback>,
}

impl BypassResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install (or replace) the bypass callback
    pub fn set(&mut self, callback: BypassCallback) {
        self.callback = Some(callback);
        debug!("Bypass callback installed");
    }

    /// Current bypass callback, if any
    pub fn get(&self) -> Option<BypassCallback> {
        self.callback.clone()
    }

    /// Whether the context is granted bypass access
    ///
    /// `false` when no callback is installed.
    pub fn evaluate(&self, context: &Context) -> Result<bool> {
        let Some(callback) = &self.callback else {
            return Ok(false);
        };

        let returned = callback
            .check(context)
            .map_err(|source| PermissionError::CallbackFailed {
                source_name: CallbackSource::Bypass,
                source: source.into(),
            })?;

        match returned {
            Value::Bool(granted) => {
                debug!("Bypass callback returned {}", granted);
                Ok(granted)
            }
            other => Err(PermissionError::InvalidCallbackReturnType {
                source_name: CallbackSource::Bypass,
                returned: other,
            }),
        }
    }
}

impl fmt::Debug for BypassResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BypassResolver")
            .field("callback", &self.callback.is_some())
            .finish()
    }
}
