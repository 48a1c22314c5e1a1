//! Public entry point for access checks
//!
//! # Pipeline
//!
//! ```text
//! tree ─→ validate ─→ decode (owned copy) ─→ strip root no_bypass
//!                                                 │
//!                 ┌───────────────────────────────┘
//!                 ↓
//!        bypass allowed? ──yes──→ BypassResolver ──true──→ grant
//!                 │                    │ false
//!                 ↓ no                 ↓
//!          PermissionTreeEvaluator ←───┘ ──→ TypeRegistry ──→ host callback
//! ```

use crate::bypass::BypassResolver;
use crate::callback::{BypassCallback, TypeCallback};
use crate::cel::{CelBypass, CelPermissionType, Engine as CelEngine};
use crate::config::{CheckerConfig, PermissionsConfig};
use crate::error::{PermissionError, Result};
use crate::evaluator::PermissionTreeEvaluator;
use crate::registry::TypeRegistry;
use crate::types::{Context, PermissionNode, NO_BYPASS_KEY};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Resolved root `no_bypass` directive
#[derive(Debug)]
enum NoBypass {
    Flag(bool),
    Condition(PermissionNode),
}

/// Evaluates permission trees against host-defined permission types
///
/// # Thread Safety
///
/// The checker is `Send + Sync` and meant to be shared behind an `Arc`.
/// Registry and bypass updates are copy-on-write: each check works on the
/// snapshot taken when it started and holds no lock while callbacks run, so
/// a callback may itself update the checker.
pub struct AccessChecker {
    types: RwLock<Arc<TypeRegistry>>,
    bypass: RwLock<Arc<BypassResolver>>,
    config: CheckerConfig,
}

impl AccessChecker {
    /// Checker with no types, no bypass and default settings
    pub fn new() -> Self {
        Self::with_config(CheckerConfig::default())
    }

    pub fn with_config(config: CheckerConfig) -> Self {
        Self {
            types: RwLock::new(Arc::new(TypeRegistry::new())),
            bypass: RwLock::new(Arc::new(BypassResolver::new())),
            config,
        }
    }

    /// Build a checker whose types and bypass are CEL expressions
    pub fn from_config(config: &PermissionsConfig) -> Result<Self> {
        config.validate()?;
        let checker = Self::with_config(config.checker_config());
        let engine = Arc::new(CelEngine::new());

        let mut types: Vec<(String, TypeCallback)> = Vec::with_capacity(config.types.len());
        for (name, expression) in &config.types {
            let check: TypeCallback =
                Arc::new(CelPermissionType::new(engine.clone(), expression.as_str())?);
            types.push((name.clone(), check));
        }
        checker.set_types(types)?;

        if let Some(expression) = &config.bypass {
            checker.set_bypass_callback(Arc::new(CelBypass::new(engine, expression.as_str())?));
        }

        info!(
            "AccessChecker configured with {} permission types, bypass={}",
            config.types.len(),
            config.bypass.is_some()
        );
        Ok(checker)
    }

    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Permission types
    // ------------------------------------------------------------------

    /// Register a permission type
    ///
    /// The callback is called once per permission value: a tree granting
    /// `{"role": ["editor", "writer"]}` asks about `"editor"`, then `"writer"`.
    pub fn add_type(&self, name: &str, callback: TypeCallback) -> Result<()> {
        let mut types = self.types.write();
        Arc::make_mut(&mut types).add(name, callback)
    }

    pub fn remove_type(&self, name: &str) -> Result<()> {
        let mut types = self.types.write();
        Arc::make_mut(&mut types).remove(name)
    }

    pub fn type_exists(&self, name: &str) -> bool {
        self.types.read().exists(name)
    }

    pub fn get_type_callback(&self, name: &str) -> Result<TypeCallback> {
        self.types.read().get_callback(name)
    }

    /// Change the callback of an already registered type
    pub fn set_type_callback(&self, name: &str, callback: TypeCallback) -> Result<()> {
        let mut types = self.types.write();
        Arc::make_mut(&mut types).set_callback(name, callback)
    }

    /// Copy of all registered types
    pub fn get_types(&self) -> IndexMap<String, TypeCallback> {
        self.types.read().get_all()
    }

    /// Replace all registered types; nothing changes if any entry is invalid
    pub fn set_types<I, S>(&self, types: I) -> Result<()>
    where
        I: IntoIterator<Item = (S, TypeCallback)>,
        S: Into<String>,
    {
        let mut staged = TypeRegistry::new();
        staged.replace_all(types)?;
        *self.types.write() = Arc::new(staged);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Bypass
    // ------------------------------------------------------------------

    pub fn get_bypass_callback(&self) -> Option<BypassCallback> {
        self.bypass.read().get()
    }

    pub fn set_bypass_callback(&self, callback: BypassCallback) {
        let mut bypass = self.bypass.write();
        Arc::make_mut(&mut bypass).set(callback);
    }

    /// Every key a permission tree may contain
    pub fn get_valid_permission_keys(&self) -> Vec<String> {
        self.types.read().valid_keys()
    }

    // ------------------------------------------------------------------
    // Access checks
    // ------------------------------------------------------------------

    /// Check access for a JSON permission tree
    ///
    /// # Arguments
    ///
    /// * `tree` - Permission tree (boolean, string, array or object)
    /// * `context` - Object handed untouched to every callback
    /// * `allow_bypass` - Whether the bypass callback may be consulted
    ///
    /// # Errors
    ///
    /// Fails fast on the first malformed node, unregistered type or callback
    /// contract violation. The caller's tree is never modified.
    ///
    /// The whole tree is decoded before anything is evaluated. A number or
    /// `null` anywhere in it fails with
    /// [`PermissionError::InvalidArgumentType`] at that point, so such a tree
    /// is rejected even when the bypass callback would have granted access.
    pub fn check_access(&self, tree: &Value, context: &Context, allow_bypass: bool) -> Result<bool> {
        validate_tree_argument(tree)?;
        validate_context(context)?;

        let (tree, no_bypass) = match tree {
            Value::Object(map) if map.contains_key(NO_BYPASS_KEY) => {
                let no_bypass = match &map[NO_BYPASS_KEY] {
                    Value::Bool(b) => NoBypass::Flag(*b),
                    value @ Value::Object(_) => {
                        NoBypass::Condition(PermissionNode::from_json(value)?)
                    }
                    other => return Err(invalid_no_bypass(other)),
                };
                let rest: Map<String, Value> = map
                    .iter()
                    .filter(|(key, _)| key.as_str() != NO_BYPASS_KEY)
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect();
                (PermissionNode::from_json(&Value::Object(rest))?, Some(no_bypass))
            }
            other => (PermissionNode::from_json(other)?, None),
        };

        self.decide(tree, no_bypass, context, allow_bypass)
    }

    /// Check access with bypass allowed
    pub fn check(&self, tree: &Value, context: &Context) -> Result<bool> {
        self.check_access(tree, context, true)
    }

    /// Check access for an already decoded tree
    pub fn check_tree(
        &self,
        tree: &PermissionNode,
        context: &Context,
        allow_bypass: bool,
    ) -> Result<bool> {
        validate_context(context)?;

        let mut tree = tree.clone();
        let mut no_bypass = None;
        if let PermissionNode::Mapping(entries) = &mut tree {
            if let Some(index) = entries.iter().position(|(key, _)| key == NO_BYPASS_KEY) {
                let (_, value) = entries.remove(index);
                no_bypass = Some(match value {
                    PermissionNode::Bool(b) => NoBypass::Flag(b),
                    node @ PermissionNode::Mapping(_) => NoBypass::Condition(node),
                    other => return Err(invalid_no_bypass(other)),
                });
            }
        }

        self.decide(tree, no_bypass, context, allow_bypass)
    }

    fn decide(
        &self,
        tree: PermissionNode,
        no_bypass: Option<NoBypass>,
        context: &Context,
        mut allow_bypass: bool,
    ) -> Result<bool> {
        let registry = Arc::clone(&self.types.read());
        let bypass = Arc::clone(&self.bypass.read());
        let evaluator =
            PermissionTreeEvaluator::new(&registry).with_max_depth(self.config.max_depth);

        match no_bypass {
            Some(NoBypass::Flag(forbid)) => {
                allow_bypass = allow_bypass && !forbid;
            }
            // Condition is only worth evaluating while bypass is still possible
            Some(NoBypass::Condition(condition)) if allow_bypass => {
                allow_bypass = !evaluator.evaluate(&condition, None, context)?;
            }
            Some(NoBypass::Condition(_)) | None => {}
        }
        debug!(allow_bypass, "Resolved bypass permission");

        if allow_bypass && bypass.evaluate(context)? {
            debug!("Access granted by bypass");
            return Ok(true);
        }

        if matches!(&tree, PermissionNode::Mapping(entries) if entries.is_empty()) {
            debug!("Empty permission tree, access denied");
            return Ok(false);
        }

        let access = evaluator.evaluate(&tree, None, context)?;
        debug!(access, "Permission tree evaluated");
        Ok(access)
    }
}

impl Default for AccessChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AccessChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessChecker")
            .field("types", &*self.types.read())
            .field("bypass", &*self.bypass.read())
            .field("config", &self.config)
            .finish()
    }
}

fn validate_tree_argument(tree: &Value) -> Result<()> {
    match tree {
        Value::Null => Err(PermissionError::MissingArgument(
            "The permissions parameter is required.".to_string(),
        )),
        Value::Number(_) => Err(PermissionError::InvalidArgumentType(format!(
            "The permissions parameter must be a boolean, a string, an array or an object. Current value: {}",
            tree
        ))),
        _ => Ok(()),
    }
}

fn validate_context(context: &Context) -> Result<()> {
    match context {
        Value::Null => Err(PermissionError::MissingArgument(
            "The context parameter is required.".to_string(),
        )),
        Value::Object(_) => Ok(()),
        other => Err(PermissionError::InvalidArgumentType(format!(
            "The context parameter must be an object. Current value: {}",
            other
        ))),
    }
}

fn invalid_no_bypass(value: impl fmt::Display) -> PermissionError {
    PermissionError::InvalidArgumentValue(format!(
        "The no_bypass value must be a boolean or an object. Current value: {}",
        value
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn checker() -> AccessChecker {
        let checker = AccessChecker::new();
        checker
            .add_type(
                "flag",
                Arc::new(|flag: &str, ctx: &Context| ctx["user"][flag] == json!(true)),
            )
            .unwrap();
        checker
    }

    #[test]
    fn test_empty_tree_denies() {
        let checker = checker();
        assert!(!checker.check(&json!({}), &json!({})).unwrap());
        assert!(!checker.check(&json!({"no_bypass": false}), &json!({})).unwrap());
    }

    #[test]
    fn test_argument_validation() {
        let checker = checker();
        assert!(matches!(
            checker.check(&Value::Null, &json!({})),
            Err(PermissionError::MissingArgument(_))
        ));
        assert!(matches!(
            checker.check(&json!(1), &json!({})),
            Err(PermissionError::InvalidArgumentType(_))
        ));
        assert!(matches!(
            checker.check(&json!(true), &Value::Null),
            Err(PermissionError::MissingArgument(_))
        ));
        assert!(matches!(
            checker.check(&json!(true), &json!([])),
            Err(PermissionError::InvalidArgumentType(_))
        ));
    }

    #[test]
    fn test_invalid_no_bypass_value() {
        let checker = checker();
        for value in [json!("yes"), json!(["x"]), json!(1)] {
            assert!(matches!(
                checker.check(&json!({"no_bypass": value, "flag": "x"}), &json!({})),
                Err(PermissionError::InvalidArgumentValue(_))
            ));
        }
    }

    #[test]
    fn test_check_tree_strips_no_bypass() {
        let checker = checker();
        checker.set_bypass_callback(Arc::new(|_ctx: &Context| true));

        let tree = PermissionNode::Mapping(vec![
            ("no_bypass".to_string(), PermissionNode::Bool(true)),
            ("flag".to_string(), PermissionNode::from("beta")),
        ]);
        assert!(!checker.check_tree(&tree, &json!({"user": {}}), true).unwrap());
        assert!(checker
            .check_tree(&tree, &json!({"user": {"beta": true}}), true)
            .unwrap());
        // Caller's tree still carries the directive
        assert!(matches!(&tree, PermissionNode::Mapping(entries) if entries.len() == 2));
    }

    #[test]
    fn test_callback_may_mutate_checker() {
        let checker = Arc::new(AccessChecker::new());
        let handle = Arc::downgrade(&checker);
        checker
            .add_type(
                "lazy",
                Arc::new(move |_perm: &str, _ctx: &Context| {
                    if let Some(checker) = handle.upgrade() {
                        let _ = checker.add_type("late", Arc::new(|_p: &str, _c: &Context| true));
                    }
                    true
                }),
            )
            .unwrap();

        assert!(checker.check(&json!({"lazy": "x"}), &json!({})).unwrap());
        assert!(checker.type_exists("late"));
    }

    #[test]
    fn test_set_types_is_atomic() {
        let checker = checker();
        let result = checker.set_types(vec![
            ("role", Arc::new(|_p: &str, _c: &Context| true) as TypeCallback),
            ("NOT", Arc::new(|_p: &str, _c: &Context| true) as TypeCallback),
        ]);
        assert!(result.is_err());
        assert!(checker.type_exists("flag"));
        assert!(!checker.type_exists("role"));
    }
}
