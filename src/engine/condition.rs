//! Minimal condition grammar for workflow steps.
//!
//! A condition compares one field of the previous step's result against a
//! literal: `result.<field> <op> <value>` where `<op>` is one of
//! `==  !=  >  <  >=  <=` and the value is a bare token or a quoted string.

use thiserror::Error;

use crate::engine::types::ExecResult;

#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("empty condition expression")]
    Empty,
    #[error("condition must reference `result.<field>`: {0}")]
    MissingPrefix(String),
    #[error("no comparison operator found in condition: {0}")]
    NoOperator(String),
    #[error("condition is missing a right-hand value: {0}")]
    MissingValue(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl CmpOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Gt => ">",
            CmpOp::Lt => "<",
            CmpOp::Ge => ">=",
            CmpOp::Le => "<=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub op: CmpOp,
    pub value: String,
}

/// Parse a condition expression.
pub fn parse(expr: &str) -> Result<Condition, ConditionError> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(ConditionError::Empty);
    }

    // Two-character operators must be tried before their one-character
    // prefixes, or `>=` would parse as `>` with a dangling `=`.
    const OPS: [(&str, CmpOp); 6] = [
        ("==", CmpOp::Eq),
        ("!=", CmpOp::Ne),
        (">=", CmpOp::Ge),
        ("<=", CmpOp::Le),
        (">", CmpOp::Gt),
        ("<", CmpOp::Lt),
    ];

    let (pos, op_str, op) = OPS
        .iter()
        .filter_map(|(s, op)| expr.find(s).map(|pos| (pos, *s, *op)))
        .min_by_key(|(pos, s, _)| (*pos, std::cmp::Reverse(s.len())))
        .ok_or_else(|| ConditionError::NoOperator(expr.to_string()))?;

    let left = expr[..pos].trim();
    let right = expr[pos + op_str.len()..].trim();

    let field = left
        .strip_prefix("result.")
        .ok_or_else(|| ConditionError::MissingPrefix(expr.to_string()))?;
    if field.is_empty() {
        return Err(ConditionError::MissingPrefix(expr.to_string()));
    }
    if right.is_empty() {
        return Err(ConditionError::MissingValue(expr.to_string()));
    }

    Ok(Condition {
        field: field.to_string(),
        op,
        value: right.trim_matches('"').trim_matches('\'').to_string(),
    })
}

/// Evaluate a parsed condition against the previous step's result.
///
/// A missing field is never satisfied. Numeric comparison is attempted first;
/// when either side is not numeric, only `==`/`!=` compare as strings — the
/// ordering operators are treated as satisfied (permissive fallback).
pub fn evaluate(cond: &Condition, previous: &ExecResult) -> bool {
    let Some(actual) = previous.get(&cond.field) else {
        return false;
    };

    let actual_num = match actual {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    };
    if let (Some(left), Ok(right)) = (actual_num, cond.value.parse::<f64>()) {
        return match cond.op {
            CmpOp::Eq => (left - right).abs() < f64::EPSILON,
            CmpOp::Ne => (left - right).abs() >= f64::EPSILON,
            CmpOp::Gt => left > right,
            CmpOp::Lt => left < right,
            CmpOp::Ge => left >= right,
            CmpOp::Le => left <= right,
        };
    }

    let actual_str = match actual {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    };

    match cond.op {
        CmpOp::Eq => actual_str == cond.value,
        CmpOp::Ne => actual_str != cond.value,
        // Ordering against non-numeric values is not meaningful; the step
        // runs rather than being silently skipped.
        _ => true,
    }
}
