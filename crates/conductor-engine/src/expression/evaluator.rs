//! Evaluator for parsed parameter expressions.

use std::collections::HashMap;

use serde_json::Value;

use super::parser::{BinaryOperator, Expr, Literal, UnaryOperator};
use super::{ExpressionError, ExpressionResult};

/// Evaluates expression ASTs against the execution data map.
///
/// Identifier resolution is strict: an unknown root key or a missing
/// property yields an error carrying the offending dotted path. The
/// null-coalescing operator is the escape hatch; its left side may fail to
/// resolve without failing the whole expression.
#[derive(Default)]
pub struct Evaluator;

impl Evaluator {
    pub fn new() -> Self {
        Self
    }

    pub fn eval(&self, expr: &Expr, data: &HashMap<String, Value>) -> ExpressionResult<Value> {
        match expr {
            Expr::Literal(lit) => Ok(eval_literal(lit)),
            Expr::Ident(name) => data
                .get(name)
                .cloned()
                .ok_or_else(|| ExpressionError::UnknownIdentifier(name.clone())),
            Expr::Property { object, property } => {
                let value = self.eval(object, data)?;
                self.eval_property(expr, &value, property)
            }
            Expr::Index { object, index } => {
                let value = self.eval(object, data)?;
                let idx = self.eval(index, data)?;
                self.eval_index(&value, &idx)
            }
            Expr::Binary { left, op, right } => self.eval_binary(left, *op, right, data),
            Expr::Unary { op, operand } => {
                let value = self.eval(operand, data)?;
                Ok(match op {
                    UnaryOperator::Not => Value::Bool(!is_truthy(&value)),
                    UnaryOperator::Neg => number_value(-value_to_number(&value)),
                })
            }
            Expr::Conditional {
                condition,
                then_expr,
                else_expr,
            } => {
                let cond = self.eval(condition, data)?;
                if is_truthy(&cond) {
                    self.eval(then_expr, data)
                } else {
                    self.eval(else_expr, data)
                }
            }
        }
    }

    fn eval_property(&self, full: &Expr, value: &Value, property: &str) -> ExpressionResult<Value> {
        match value {
            Value::Object(map) => map.get(property).cloned().ok_or_else(|| {
                ExpressionError::PropertyNotFound(
                    full.path().unwrap_or_else(|| property.to_string()),
                )
            }),
            Value::Null => Err(ExpressionError::PropertyNotFound(
                full.path().unwrap_or_else(|| property.to_string()),
            )),
            other => Err(ExpressionError::Type {
                expected: "object".to_string(),
                actual: type_name(other).to_string(),
            }),
        }
    }

    fn eval_index(&self, value: &Value, index: &Value) -> ExpressionResult<Value> {
        match (value, index) {
            (Value::Array(arr), Value::Number(n)) => {
                let i = n.as_i64().unwrap_or(-1);
                if i < 0 {
                    return Err(ExpressionError::InvalidIndex(n.to_string()));
                }
                arr.get(i as usize)
                    .cloned()
                    .ok_or_else(|| ExpressionError::InvalidIndex(format!("{i} out of bounds")))
            }
            (Value::Object(map), Value::String(key)) => map
                .get(key)
                .cloned()
                .ok_or_else(|| ExpressionError::PropertyNotFound(key.clone())),
            (other, idx) => Err(ExpressionError::InvalidIndex(format!(
                "cannot index {} with {}",
                type_name(other),
                type_name(idx)
            ))),
        }
    }

    fn eval_binary(
        &self,
        left: &Expr,
        op: BinaryOperator,
        right: &Expr,
        data: &HashMap<String, Value>,
    ) -> ExpressionResult<Value> {
        // Short-circuiting operators evaluate the right side lazily.
        match op {
            BinaryOperator::And => {
                let left_val = self.eval(left, data)?;
                if !is_truthy(&left_val) {
                    return Ok(left_val);
                }
                return self.eval(right, data);
            }
            BinaryOperator::Or => {
                let left_val = self.eval(left, data)?;
                if is_truthy(&left_val) {
                    return Ok(left_val);
                }
                return self.eval(right, data);
            }
            BinaryOperator::NullishCoalesce => {
                // An unresolved path on the left falls through to the right,
                // so `maybe.missing ?? fallback` works as users expect.
                return match self.eval(left, data) {
                    Ok(Value::Null) => self.eval(right, data),
                    Ok(value) => Ok(value),
                    Err(
                        ExpressionError::UnknownIdentifier(_)
                        | ExpressionError::PropertyNotFound(_),
                    ) => self.eval(right, data),
                    Err(e) => Err(e),
                };
            }
            _ => {}
        }

        let left_val = self.eval(left, data)?;
        let right_val = self.eval(right, data)?;

        match op {
            BinaryOperator::Add => Ok(eval_add(&left_val, &right_val)),
            BinaryOperator::Sub => Ok(number_value(
                value_to_number(&left_val) - value_to_number(&right_val),
            )),
            BinaryOperator::Mul => Ok(number_value(
                value_to_number(&left_val) * value_to_number(&right_val),
            )),
            BinaryOperator::Div => {
                let divisor = value_to_number(&right_val);
                if divisor == 0.0 {
                    return Err(ExpressionError::Evaluation("division by zero".to_string()));
                }
                Ok(number_value(value_to_number(&left_val) / divisor))
            }
            BinaryOperator::Mod => {
                let divisor = value_to_number(&right_val);
                if divisor == 0.0 {
                    return Err(ExpressionError::Evaluation("modulo by zero".to_string()));
                }
                Ok(number_value(value_to_number(&left_val) % divisor))
            }
            BinaryOperator::Eq => Ok(Value::Bool(values_equal(&left_val, &right_val))),
            BinaryOperator::Ne => Ok(Value::Bool(!values_equal(&left_val, &right_val))),
            BinaryOperator::Lt => compare(&left_val, &right_val, |o| o.is_lt()),
            BinaryOperator::Le => compare(&left_val, &right_val, |o| o.is_le()),
            BinaryOperator::Gt => compare(&left_val, &right_val, |o| o.is_gt()),
            BinaryOperator::Ge => compare(&left_val, &right_val, |o| o.is_ge()),
            BinaryOperator::And | BinaryOperator::Or | BinaryOperator::NullishCoalesce => {
                unreachable!("handled above")
            }
        }
    }
}

fn eval_literal(lit: &Literal) -> Value {
    match lit {
        Literal::Null => Value::Null,
        Literal::Boolean(b) => Value::Bool(*b),
        Literal::Number(n) => number_value(*n),
        Literal::String(s) => Value::String(s.clone()),
    }
}

/// Addition concatenates when either operand is a string.
fn eval_add(left: &Value, right: &Value) -> Value {
    match (left, right) {
        (Value::String(l), r) => Value::String(format!("{l}{}", value_to_string(r))),
        (l, Value::String(r)) => Value::String(format!("{}{r}", value_to_string(l))),
        (l, r) => number_value(value_to_number(l) + value_to_number(r)),
    }
}

fn compare<F>(left: &Value, right: &Value, cmp: F) -> ExpressionResult<Value>
where
    F: Fn(std::cmp::Ordering) -> bool,
{
    let result = match (left, right) {
        (Value::Number(l), Value::Number(r)) => {
            let l = l.as_f64().unwrap_or(0.0);
            let r = r.as_f64().unwrap_or(0.0);
            cmp(l.partial_cmp(&r).unwrap_or(std::cmp::Ordering::Equal))
        }
        (Value::String(l), Value::String(r)) => cmp(l.cmp(r)),
        (l, r) => {
            return Err(ExpressionError::Type {
                expected: "comparable operands".to_string(),
                actual: format!("{} and {}", type_name(l), type_name(r)),
            })
        }
    };
    Ok(Value::Bool(result))
}

/// Integral results stay integer-typed so downstream comparisons behave.
fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n >= i64::MIN as f64 && n <= i64::MAX as f64 {
        Value::Number((n as i64).into())
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|n| n != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(arr) => !arr.is_empty(),
        Value::Object(_) => true,
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => {
            l.as_f64().unwrap_or(0.0) == r.as_f64().unwrap_or(0.0)
        }
        // Loose equality for number/string pairs.
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            s.parse::<f64>().ok() == n.as_f64()
        }
        (l, r) => l == r,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

fn value_to_number(value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.parse().unwrap_or(0.0),
        Value::Array(_) | Value::Object(_) => f64::NAN,
    }
}
