//! Permission tree evaluator
//!
//! Interprets a [`PermissionNode`] by shape:
//!
//! ```text
//! Bool                → literal (untyped positions only)
//! String              → "TRUE"/"FALSE" literal, or a value for the active type
//! Sequence            → shorthand OR
//! {GATE: value}       → AND | NAND | OR | NOR | XOR | NOT over value
//! {type: value}       → fixes the type scope for value
//! {k1: v1, k2: v2..}  → shorthand OR over the single-entry mappings
//! ```
//!
//! Evaluation is synchronous and short-circuits in declaration order.

use crate::error::{CallbackSource, PermissionError, Result};
use crate::registry::TypeRegistry;
use crate::types::{Context, LogicGate, PermissionNode, FALSE_LITERAL, NO_BYPASS_KEY, TRUE_LITERAL};
use serde_json::Value;
use tracing::trace;

/// Default recursion limit for a single tree
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// One operand of a gate: a node, or a mapping entry treated as `{key: value}`
#[derive(Debug, Clone, Copy)]
enum Operand<'n> {
    Node(&'n PermissionNode),
    Entry(&'n str, &'n PermissionNode),
}

/// Recursive evaluator over a registry snapshot
pub struct PermissionTreeEvaluator<'a> {
    registry: &'a TypeRegistry,
    max_depth: usize,
}

impl<'a> PermissionTreeEvaluator<'a> {
    pub fn new(registry: &'a TypeRegistry) -> Self {
        Self {
            registry,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Override the recursion limit
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Evaluate `node` with an optional active type scope
    ///
    /// # Errors
    ///
    /// Any malformed node, unregistered type, gate arity violation or
    /// callback contract breach aborts the evaluation.
    pub fn evaluate(
        &self,
        node: &PermissionNode,
        active_type: Option<&str>,
        context: &Context,
    ) -> Result<bool> {
        self.dispatch(node, active_type, context, 0)
    }

    fn dispatch(
        &self,
        node: &PermissionNode,
        active_type: Option<&str>,
        context: &Context,
        depth: usize,
    ) -> Result<bool> {
        if depth > self.max_depth {
            return Err(PermissionError::TreeTooDeep {
                limit: self.max_depth,
            });
        }

        match node {
            PermissionNode::Bool(b) => match active_type {
                None => Ok(*b),
                Some(ty) => Err(literal_under_type(node, ty)),
            },
            PermissionNode::String(s) => self.dispatch_string(s, active_type, context),
            PermissionNode::Sequence(items) => {
                if items.is_empty() {
                    return Err(PermissionError::gate_value(
                        LogicGate::Or,
                        "The value array of an OR gate must contain a minimum of one element",
                        node,
                    ));
                }
                self.any(items.iter().map(Operand::Node), active_type, context, depth + 1)
            }
            PermissionNode::Mapping(entries) => match entries.as_slice() {
                [] => Err(PermissionError::gate_value(
                    LogicGate::Or,
                    "The value object of an OR gate must contain a minimum of one element",
                    node,
                )),
                [(key, value)] => self.dispatch_entry(key, value, active_type, context, depth),
                _ => self.any(
                    entries.iter().map(|(key, value)| Operand::Entry(key, value)),
                    active_type,
                    context,
                    depth,
                ),
            },
        }
    }

    fn dispatch_entry(
        &self,
        key: &str,
        value: &PermissionNode,
        active_type: Option<&str>,
        context: &Context,
        depth: usize,
    ) -> Result<bool> {
        if let Some(gate) = LogicGate::from_key(key) {
            return self.apply_gate(gate, value, active_type, context, depth + 1);
        }

        if key == NO_BYPASS_KEY {
            return Err(PermissionError::InvalidArgumentValue(format!(
                "The no_bypass key is only allowed at the root of a permission tree. Evaluated permissions: {}",
                PermissionNode::entry(key, value.clone())
            )));
        }
        if key == TRUE_LITERAL || key == FALSE_LITERAL {
            return Err(PermissionError::InvalidArgumentValue(format!(
                "The literal \"{}\" cannot be used as a key. Evaluated permissions: {}",
                key,
                PermissionNode::entry(key, value.clone())
            )));
        }

        if let Some(existing) = active_type {
            return Err(PermissionError::InvalidArgumentValue(format!(
                "You cannot put a permission type as a descendant to another permission type. Existing type: {}. Evaluated permissions: {}",
                existing,
                PermissionNode::entry(key, value.clone())
            )));
        }

        trace!(permission_type = key, "Entering type scope");
        self.dispatch(value, Some(key), context, depth + 1)
    }

    fn dispatch_string(&self, s: &str, active_type: Option<&str>, context: &Context) -> Result<bool> {
        match active_type {
            None => match s {
                TRUE_LITERAL => Ok(true),
                FALSE_LITERAL => Ok(false),
                other => Err(PermissionError::InvalidArgumentValue(format!(
                    "A string outside of a permission type must be \"TRUE\" or \"FALSE\". Current value: \"{}\"",
                    other
                ))),
            },
            Some(ty) if s == TRUE_LITERAL || s == FALSE_LITERAL => {
                Err(literal_under_type(&PermissionNode::String(s.to_string()), ty))
            }
            Some(ty) => self.external_check(ty, s, context),
        }
    }

    fn external_check(&self, ty: &str, permission: &str, context: &Context) -> Result<bool> {
        let callback = self.registry.get_callback(ty)?;
        let returned = callback
            .check(permission, context)
            .map_err(|source| PermissionError::CallbackFailed {
                source_name: CallbackSource::PermissionType(ty.to_string()),
                source: source.into(),
            })?;

        match returned {
            Value::Bool(granted) => {
                trace!(permission_type = ty, permission, granted, "Permission checked");
                Ok(granted)
            }
            other => Err(PermissionError::InvalidCallbackReturnType {
                source_name: CallbackSource::PermissionType(ty.to_string()),
                returned: other,
            }),
        }
    }

    fn apply_gate(
        &self,
        gate: LogicGate,
        value: &PermissionNode,
        active_type: Option<&str>,
        context: &Context,
        depth: usize,
    ) -> Result<bool> {
        let result = match gate {
            LogicGate::And => self.all(operands(gate, value)?, active_type, context, depth)?,
            LogicGate::Nand => !self.all(operands(gate, value)?, active_type, context, depth)?,
            LogicGate::Or => self.any(operands(gate, value)?, active_type, context, depth)?,
            LogicGate::Nor => !self.any(operands(gate, value)?, active_type, context, depth)?,
            LogicGate::Xor => self.disagree(operands(gate, value)?, active_type, context, depth)?,
            LogicGate::Not => !self.negated(value, active_type, context, depth)?,
        };

        trace!(gate = %gate, result, "Logic gate evaluated");
        Ok(result)
    }

    fn evaluate_operand(
        &self,
        operand: Operand<'_>,
        active_type: Option<&str>,
        context: &Context,
        depth: usize,
    ) -> Result<bool> {
        match operand {
            Operand::Node(node) => self.dispatch(node, active_type, context, depth),
            Operand::Entry(key, value) => {
                self.dispatch_entry(key, value, active_type, context, depth)
            }
        }
    }

    fn any<'n>(
        &self,
        operands: impl IntoIterator<Item = Operand<'n>>,
        active_type: Option<&str>,
        context: &Context,
        depth: usize,
    ) -> Result<bool> {
        for operand in operands {
            if self.evaluate_operand(operand, active_type, context, depth)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn all<'n>(
        &self,
        operands: impl IntoIterator<Item = Operand<'n>>,
        active_type: Option<&str>,
        context: &Context,
        depth: usize,
    ) -> Result<bool> {
        for operand in operands {
            if !self.evaluate_operand(operand, active_type, context, depth)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// True once both a granted and a denied operand have been seen
    fn disagree<'n>(
        &self,
        operands: impl IntoIterator<Item = Operand<'n>>,
        active_type: Option<&str>,
        context: &Context,
        depth: usize,
    ) -> Result<bool> {
        let (mut seen_true, mut seen_false) = (false, false);
        for operand in operands {
            if self.evaluate_operand(operand, active_type, context, depth)? {
                seen_true = true;
            } else {
                seen_false = true;
            }
            if seen_true && seen_false {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn negated(
        &self,
        value: &PermissionNode,
        active_type: Option<&str>,
        context: &Context,
        depth: usize,
    ) -> Result<bool> {
        match value {
            PermissionNode::String(s) if s.is_empty() => Err(PermissionError::gate_value(
                LogicGate::Not,
                "A NOT permission cannot have an empty string as its value",
                value,
            )),
            PermissionNode::String(_) => self.dispatch(value, active_type, context, depth),
            PermissionNode::Mapping(entries) if entries.len() == 1 => {
                self.dispatch(value, active_type, context, depth)
            }
            // Indexed object `{"0": X}`
            PermissionNode::Sequence(items) if items.len() == 1 => {
                self.dispatch(&items[0], active_type, context, depth)
            }
            PermissionNode::Mapping(_) | PermissionNode::Sequence(_) => {
                Err(PermissionError::gate_value(
                    LogicGate::Not,
                    "A NOT permission must have exactly one child in the value object",
                    value,
                ))
            }
            _ => Err(PermissionError::gate_value(
                LogicGate::Not,
                "The value of a NOT gate must either be an object or a string",
                value,
            )),
        }
    }
}

/// Operands of a collection-valued gate, with its arity checked
fn operands(gate: LogicGate, value: &PermissionNode) -> Result<Vec<Operand<'_>>> {
    let (shape, operands): (&str, Vec<Operand<'_>>) = match value {
        PermissionNode::Sequence(items) => ("array", items.iter().map(Operand::Node).collect()),
        PermissionNode::Mapping(entries) => (
            "object",
            entries
                .iter()
                .map(|(key, value)| Operand::Entry(key, value))
                .collect(),
        ),
        other => {
            return Err(PermissionError::gate_value(
                gate,
                format!("The value of {} gate must be an array or object", with_article(gate)),
                other,
            ))
        }
    };

    let min = gate.min_operands();
    if operands.len() < min {
        return Err(PermissionError::gate_value(
            gate,
            format!(
                "The value {} of {} gate must contain a minimum of {} element{}",
                shape,
                with_article(gate),
                min,
                if min == 1 { "" } else { "s" }
            ),
            value,
        ));
    }
    Ok(operands)
}

/// `an AND`, `a NAND`, `an XOR`
fn with_article(gate: LogicGate) -> String {
    match gate {
        LogicGate::And | LogicGate::Or | LogicGate::Xor => format!("an {}", gate),
        _ => format!("a {}", gate),
    }
}

fn literal_under_type(node: &PermissionNode, ty: &str) -> PermissionError {
    PermissionError::InvalidArgumentValue(format!(
        "The literal {} cannot be used as a value of the permission type \"{}\"",
        node, ty
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::TypeCallback;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn role_callback() -> TypeCallback {
        Arc::new(|role: &str, ctx: &Context| {
            ctx["user"]["roles"]
                .as_array()
                .map(|roles| roles.iter().any(|r| r == role))
                .unwrap_or(false)
        })
    }

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        registry.add("role", role_callback()).unwrap();
        registry
    }

    fn node(value: serde_json::Value) -> PermissionNode {
        PermissionNode::from_json(&value).unwrap()
    }

    fn ctx(roles: &[&str]) -> Context {
        json!({"user": {"id": 1, "roles": roles}})
    }

    #[test]
    fn test_literals_at_untyped_positions() {
        let registry = registry();
        let evaluator = PermissionTreeEvaluator::new(&registry);
        let ctx = ctx(&[]);

        assert!(evaluator.evaluate(&node(json!(true)), None, &ctx).unwrap());
        assert!(!evaluator.evaluate(&node(json!(false)), None, &ctx).unwrap());
        assert!(evaluator.evaluate(&node(json!("TRUE")), None, &ctx).unwrap());
        assert!(!evaluator.evaluate(&node(json!(["FALSE"])), None, &ctx).unwrap());
    }

    #[test]
    fn test_bare_string_without_type() {
        let registry = registry();
        let evaluator = PermissionTreeEvaluator::new(&registry);

        assert!(matches!(
            evaluator.evaluate(&node(json!("admin")), None, &ctx(&[])),
            Err(PermissionError::InvalidArgumentValue(_))
        ));
        // Literals are case-sensitive
        assert!(evaluator.evaluate(&node(json!("true")), None, &ctx(&[])).is_err());
    }

    #[test]
    fn test_literal_under_type_scope() {
        let registry = registry();
        let evaluator = PermissionTreeEvaluator::new(&registry);

        for tree in [json!({"role": [true]}), json!({"role": "TRUE"}), json!({"role": {"NOT": "FALSE"}})] {
            assert!(
                matches!(
                    evaluator.evaluate(&node(tree.clone()), None, &ctx(&[])),
                    Err(PermissionError::InvalidArgumentValue(_))
                ),
                "tree {} should be rejected",
                tree
            );
        }
    }

    #[test]
    fn test_active_type_parameter() {
        let registry = registry();
        let evaluator = PermissionTreeEvaluator::new(&registry);
        let ctx = ctx(&["editor"]);

        assert!(evaluator.evaluate(&node(json!("editor")), Some("role"), &ctx).unwrap());
        assert!(!evaluator.evaluate(&node(json!("admin")), Some("role"), &ctx).unwrap());
        assert!(matches!(
            evaluator.evaluate(&node(json!("x")), Some("flag"), &ctx),
            Err(PermissionError::PermissionTypeNotRegistered(name)) if name == "flag"
        ));
    }

    #[test]
    fn test_nested_types_rejected() {
        let mut registry = registry();
        registry.add("flag", Arc::new(|_f: &str, _c: &Context| true)).unwrap();
        let evaluator = PermissionTreeEvaluator::new(&registry);

        let tree = node(json!({"role": {"OR": ["admin", {"flag": "beta"}]}}));
        assert!(matches!(
            evaluator.evaluate(&tree, None, &ctx(&[])),
            Err(PermissionError::InvalidArgumentValue(msg)) if msg.contains("Existing type: role")
        ));
    }

    #[test]
    fn test_no_bypass_below_root() {
        let registry = registry();
        let evaluator = PermissionTreeEvaluator::new(&registry);

        let tree = node(json!({"AND": [{"no_bypass": true}, "TRUE"]}));
        assert!(matches!(
            evaluator.evaluate(&tree, None, &ctx(&[])),
            Err(PermissionError::InvalidArgumentValue(msg)) if msg.contains("no_bypass")
        ));
    }

    #[test]
    fn test_empty_collections() {
        let registry = registry();
        let evaluator = PermissionTreeEvaluator::new(&registry);

        for tree in [json!([]), json!({"role": []}), json!({"role": {}})] {
            assert!(matches!(
                evaluator.evaluate(&node(tree), None, &ctx(&[])),
                Err(PermissionError::InvalidLogicGateValue { gate: LogicGate::Or, .. })
            ));
        }
    }

    #[test]
    fn test_gate_value_shapes() {
        let registry = registry();
        let evaluator = PermissionTreeEvaluator::new(&registry);
        let ctx = ctx(&["admin"]);

        assert!(matches!(
            evaluator.evaluate(&node(json!({"role": {"AND": "admin"}})), None, &ctx),
            Err(PermissionError::InvalidLogicGateValue { gate: LogicGate::And, .. })
        ));
        assert!(matches!(
            evaluator.evaluate(&node(json!({"role": {"XOR": ["admin"]}})), None, &ctx),
            Err(PermissionError::InvalidLogicGateValue { gate: LogicGate::Xor, .. })
        ));
        assert!(matches!(
            evaluator.evaluate(&node(json!({"role": {"NOT": ["admin", "editor"]}})), None, &ctx),
            Err(PermissionError::InvalidLogicGateValue { gate: LogicGate::Not, .. })
        ));
        assert!(matches!(
            evaluator.evaluate(&node(json!({"role": {"NOT": true}})), None, &ctx),
            Err(PermissionError::InvalidLogicGateValue { gate: LogicGate::Not, .. })
        ));
        assert!(matches!(
            evaluator.evaluate(&node(json!({"role": {"NOT": ""}})), None, &ctx),
            Err(PermissionError::InvalidLogicGateValue { gate: LogicGate::Not, .. })
        ));
        assert!(matches!(
            evaluator.evaluate(&node(json!({"role": {"NOT": {"0": "a", "x": "b"}}})), None, &ctx),
            Err(PermissionError::InvalidLogicGateValue { gate: LogicGate::Not, .. })
        ));
    }

    #[test]
    fn test_single_indexed_object_is_one_operand() {
        let registry = registry();
        let evaluator = PermissionTreeEvaluator::new(&registry);
        let ctx = ctx(&["admin"]);

        // {"0": [a, b]} is one operand: the OR of a and b
        assert!(evaluator
            .evaluate(&node(json!({"role": {"AND": {"0": ["admin", "editor"]}}})), None, &ctx)
            .unwrap());
        assert!(evaluator
            .evaluate(&node(json!({"role": {"AND": {"0": "admin"}}})), None, &ctx)
            .unwrap());
        assert!(evaluator
            .evaluate(&node(json!({"role": {"NOT": {"0": ["editor", "writer"]}}})), None, &ctx)
            .unwrap());
        assert!(!evaluator
            .evaluate(&node(json!({"role": {"NOT": {"3": "admin"}}})), None, &ctx)
            .unwrap());
        assert!(matches!(
            evaluator.evaluate(&node(json!({"role": {"XOR": {"0": ["admin", "editor"]}}})), None, &ctx),
            Err(PermissionError::InvalidLogicGateValue { gate: LogicGate::Xor, message, .. })
                if message.contains("an XOR gate")
        ));
    }

    #[test]
    fn test_gate_messages_use_article() {
        let registry = registry();
        let evaluator = PermissionTreeEvaluator::new(&registry);

        for (tree, expected) in [
            (json!({"AND": "TRUE"}), "The value of an AND gate"),
            (json!({"NAND": "TRUE"}), "The value of a NAND gate"),
            (json!({"OR": true}), "The value of an OR gate"),
            (json!({"NOR": "TRUE"}), "The value of a NOR gate"),
        ] {
            let err = evaluator.evaluate(&node(tree), None, &ctx(&[])).unwrap_err();
            assert!(err.to_string().contains(expected), "{}", err);
        }
    }

    #[test]
    fn test_gate_over_object_operands() {
        let mut registry = registry();
        registry
            .add("flag", Arc::new(|f: &str, c: &Context| c["flags"][f] == json!(true)))
            .unwrap();
        let evaluator = PermissionTreeEvaluator::new(&registry);

        let tree = node(json!({"AND": {"role": "admin", "flag": "beta"}}));
        let both = json!({"user": {"roles": ["admin"]}, "flags": {"beta": true}});
        let one = json!({"user": {"roles": ["admin"]}, "flags": {}});
        assert!(evaluator.evaluate(&tree, None, &both).unwrap());
        assert!(!evaluator.evaluate(&tree, None, &one).unwrap());
    }

    #[test]
    fn test_or_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut registry = TypeRegistry::new();
        registry
            .add(
                "count",
                Arc::new(move |perm: &str, _c: &Context| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    perm == "yes"
                }),
            )
            .unwrap();
        let evaluator = PermissionTreeEvaluator::new(&registry);

        let tree = node(json!({"count": ["no", "yes", "never"]}));
        assert!(evaluator.evaluate(&tree, None, &json!({})).unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_xor_stops_once_both_seen() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut registry = TypeRegistry::new();
        registry
            .add(
                "count",
                Arc::new(move |perm: &str, _c: &Context| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    perm == "yes"
                }),
            )
            .unwrap();
        let evaluator = PermissionTreeEvaluator::new(&registry);

        let tree = node(json!({"count": {"XOR": ["yes", "yes", "no", "yes"]}}));
        assert!(evaluator.evaluate(&tree, None, &json!({})).unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_callback_return_type() {
        let mut registry = TypeRegistry::new();
        registry
            .add("flag", Arc::new(|_f: &str, _c: &Context| json!("granted")))
            .unwrap();
        let evaluator = PermissionTreeEvaluator::new(&registry);

        assert!(matches!(
            evaluator.evaluate(&node(json!({"flag": "x"})), None, &json!({})),
            Err(PermissionError::InvalidCallbackReturnType {
                source_name: CallbackSource::PermissionType(name),
                ..
            }) if name == "flag"
        ));
    }

    #[test]
    fn test_depth_limit() {
        let registry = registry();
        let evaluator = PermissionTreeEvaluator::new(&registry).with_max_depth(8);

        let mut tree = json!("TRUE");
        for _ in 0..10 {
            tree = json!({ "NOT": tree });
        }
        assert!(matches!(
            evaluator.evaluate(&node(tree), None, &ctx(&[])),
            Err(PermissionError::TreeTooDeep { limit: 8 })
        ));
    }
}
