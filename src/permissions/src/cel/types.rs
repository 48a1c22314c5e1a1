//! Permission types and bypass checks backed by CEL expressions

use crate::callback::{BypassCheck, CallbackResult, TypeCheck};
use crate::cel::engine::Engine;
use crate::cel::error::Result;
use crate::types::Context;
use cel_interpreter::Program;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Variable holding the whole context object
pub const CONTEXT_VARIABLE: &str = "context";

/// Variable holding the permission value under evaluation
pub const PERMISSION_VARIABLE: &str = "permission";

/// Context keys become top-level variables, plus the whole object as `context`
fn context_variables(context: &Context) -> Map<String, Value> {
    let mut vars = context.as_object().cloned().unwrap_or_default();
    vars.insert(CONTEXT_VARIABLE.to_string(), context.clone());
    vars
}

/// Permission type whose check is a CEL expression
///
/// ```text
/// "role": "permission in user.roles"
/// ```
pub struct CelPermissionType {
    engine: Arc<Engine>,
    expression: String,
    program: Arc<Program>,
}

impl CelPermissionType {
    /// Compile `expression` up front so bad config fails at load time
    pub fn new(engine: Arc<Engine>, expression: impl Into<String>) -> Result<Self> {
        let expression = expression.into();
        let program = engine.compile(&expression)?;
        Ok(Self {
            engine,
            expression,
            program,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }
}

impl TypeCheck for CelPermissionType {
    fn check(&self, permission: &str, context: &Context) -> CallbackResult {
        let mut vars = context_variables(context);
        vars.insert(
            PERMISSION_VARIABLE.to_string(),
            Value::String(permission.to_string()),
        );
        Ok(self.engine.execute(&self.program, &vars)?)
    }
}

impl fmt::Debug for CelPermissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CelPermissionType")
            .field("expression", &self.expression)
            .finish()
    }
}

/// Bypass check written as a CEL expression over the context
pub struct CelBypass {
    engine: Arc<Engine>,
    expression: String,
    program: Arc<Program>,
}

impl CelBypass {
    pub fn new(engine: Arc<Engine>, expression: impl Into<String>) -> Result<Self> {
        let expression = expression.into();
        let program = engine.compile(&expression)?;
        Ok(Self {
            engine,
            expression,
            program,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }
}

impl BypassCheck for CelBypass {
    fn check(&self, context: &Context) -> CallbackResult {
        Ok(self.engine.execute(&self.program, &context_variables(context))?)
    }
}

impl fmt::Debug for CelBypass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CelBypass")
            .field("expression", &self.expression)
            .finish()
    }
}
