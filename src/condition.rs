use crate::variables::{VariableScope, decompose};
use anyhow::{Result, anyhow};
use evalexpr::{ContextWithMutableVariables, DefaultNumericTypes, HashMapContext, build_operator_tree};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Debug;

type EvalValue = evalexpr::Value<DefaultNumericTypes>;

/// Evaluates a boolean expression against a variable scope.
pub trait ConditionEvaluator: Send + Sync + Debug {
    fn evaluate(&self, expression: &str, scope: &dyn VariableScope) -> Result<bool>;

    /// Checks an expression at deployment time.
    fn validate(&self, _expression: &str) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct EvalexprConditionEvaluator;

impl ConditionEvaluator for EvalexprConditionEvaluator {
    fn evaluate(&self, expression: &str, scope: &dyn VariableScope) -> Result<bool> {
        let tree = build_operator_tree::<DefaultNumericTypes>(&strip_placeholders(expression))
            .map_err(|e| anyhow!("{}", e))?;

        // Record components first so explicit bindings of the same name win.
        let bindings = scope.bindings();
        let mut values: HashMap<String, Value> = bindings
            .iter()
            .flat_map(|(name, value)| decompose(name, value))
            .collect();
        values.extend(bindings);

        let mut eval_ctx = HashMapContext::<DefaultNumericTypes>::new();
        for (name, value) in values {
            if let Some(ev) = to_eval_value(&value) {
                eval_ctx.set_value(name, ev).map_err(|e| anyhow!("{}", e))?;
            }
        }

        tree.eval_boolean_with_context(&eval_ctx)
            .map_err(|e| anyhow!("{}", e))
    }

    fn validate(&self, expression: &str) -> Result<()> {
        build_operator_tree::<DefaultNumericTypes>(&strip_placeholders(expression))
            .map(|_| ())
            .map_err(|e| anyhow!("{}", e))
    }
}

/// Accepts both `x > 1` and `${x} > 1`. Only closed `${name}` wrappers are unwrapped.
fn strip_placeholders(expression: &str) -> String {
    let mut out = String::with_capacity(expression.len());
    let mut rest = expression;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start + 2..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        out.push_str(&rest[start + 2..start + 2 + len]);
        rest = &rest[start + 3 + len..];
    }
    out.push_str(rest);
    out
}

fn to_eval_value(value: &Value) -> Option<EvalValue> {
    match value {
        Value::String(s) => Some(EvalValue::String(s.clone())),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() { Some(EvalValue::Int(i)) }
            else { n.as_f64().map(EvalValue::Float) }
        }
        Value::Bool(b) => Some(EvalValue::Boolean(*b)),
        Value::Null => Some(EvalValue::Empty),
        Value::Array(items) => Some(EvalValue::Tuple(
            items.iter().filter_map(to_eval_value).collect(),
        )),
        Value::Object(_) => None,
    }
}
