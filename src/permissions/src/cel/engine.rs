//! CEL expression engine with compiled program caching

use cel_interpreter::{Context, Program};
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::cel::{
    convert::{to_cel, to_json},
    error::{CelError, Result},
};

/// Compiles permission expressions once and runs them against contexts
///
/// Results are handed back as JSON without coercion; the access checker
/// decides what a non-boolean result means.
pub struct Engine {
    /// Expression source → compiled program
    program_cache: DashMap<String, Arc<Program>>,
}

impl Engine {
    /// Create a new CEL engine
    pub fn new() -> Self {
        Self {
            program_cache: DashMap::new(),
        }
    }

    /// Compile an expression, reusing the cached program when present
    pub fn compile(&self, expr: &str) -> Result<Arc<Program>> {
        if let Some(prog) = self.program_cache.get(expr) {
            return Ok(prog.clone());
        }

        let program = Program::compile(expr)
            .map_err(|e| CelError::Compile {
                expression: expr.to_string(),
                message: format!("{:?}", e),
            })?;

        let program = Arc::new(program);
        self.program_cache.insert(expr.to_string(), program.clone());

        Ok(program)
    }

    /// Run a compiled program; each entry of `variables` is bound by name
    pub fn execute(&self, program: &Program, variables: &Map<String, Value>) -> Result<Value> {
        let mut cel_context = Context::default();
        for (key, value) in variables {
            let _ = cel_context.add_variable(key.clone(), to_cel(value));
        }

        let result = program
            .execute(&cel_context)
            .map_err(|e| CelError::Execution(format!("{:?}", e)))?;

        Ok(to_json(&result))
    }

    /// Compile and execute an expression in one call
    pub fn evaluate_expression(&self, expr: &str, variables: &Map<String, Value>) -> Result<Value> {
        let program = self.compile(expr)?;
        self.execute(&program, variables)
    }

    /// Clear the compiled program cache
    pub fn clear_cache(&self) {
        self.program_cache.clear();
    }

    /// Number of cached programs
    pub fn cached_programs(&self) -> usize {
        self.program_cache.len()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
