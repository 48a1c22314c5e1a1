//! Host callback seam
//!
//! Permission types and the bypass slot are backed by host code. Callbacks
//! hand back a JSON value so that dynamically defined checks (CEL expressions,
//! scripted hosts) can break the boolean contract; the engine reports that as
//! [`PermissionError::InvalidCallbackReturnType`](crate::PermissionError).
//! Plain Rust closures returning `bool` satisfy the traits directly.

use crate::types::Context;
use serde_json::Value;
use std::sync::Arc;

/// What a callback produced
pub type CallbackResult = anyhow::Result<Value>;

/// Conversion of a callback's native return value
pub trait IntoCallbackResult {
    fn into_callback_result(self) -> CallbackResult;
}

impl IntoCallbackResult for bool {
    fn into_callback_result(self) -> CallbackResult {
        Ok(Value::Bool(self))
    }
}

impl IntoCallbackResult for Value {
    fn into_callback_result(self) -> CallbackResult {
        Ok(self)
    }
}

impl IntoCallbackResult for anyhow::Result<bool> {
    fn into_callback_result(self) -> CallbackResult {
        self.map(Value::Bool)
    }
}

impl IntoCallbackResult for anyhow::Result<Value> {
    fn into_callback_result(self) -> CallbackResult {
        self
    }
}

/// Evaluates one permission value of a permission type
///
/// Called once per leaf: a tree granting `{"role": ["editor", "writer"]}`
/// calls the `role` check with `"editor"`, then (if needed) `"writer"`.
pub trait TypeCheck: Send + Sync {
    fn check(&self, permission: &str, context: &Context) -> CallbackResult;
}

impl<F, R> TypeCheck for F
where
    F: Fn(&str, &Context) -> R + Send + Sync,
    R: IntoCallbackResult,
{
    fn check(&self, permission: &str, context: &Context) -> CallbackResult {
        self(permission, context).into_callback_result()
    }
}

/// Decides whether a context may skip tree evaluation entirely
pub trait BypassCheck: Send + Sync {
    fn check(&self, context: &Context) -> CallbackResult;
}

impl<F, R> BypassCheck for F
where
    F: Fn(&Context) -> R + Send + Sync,
    R: IntoCallbackResult,
{
    fn check(&self, context: &Context) -> CallbackResult {
        self(context).into_callback_result()
    }
}

/// Shared handle to a permission type callback
pub type TypeCallback = Arc<dyn TypeCheck>;

/// Shared handle to the bypass callback
pub type BypassCallback = Arc<dyn BypassCheck>;
