//! Expression resolution for `={{ … }}` parameter values.
//!
//! Expressions read named keys from the execution data map (node outputs
//! keyed by node id, plus `trigger`), support literals, dotted paths, index
//! access, arithmetic, string concatenation, comparisons, boolean operators,
//! null-coalescing and the ternary conditional. Evaluation is deterministic
//! and side-effect-free.

pub mod evaluator;
pub mod parser;

pub use evaluator::Evaluator;
pub use parser::{parse, BinaryOperator, Expr, Literal, UnaryOperator};

use std::collections::HashMap;

use conductor_workflow::ParameterMap;
use serde_json::Value;

/// Result type for expression operations.
pub type ExpressionResult<T> = Result<T, ExpressionError>;

/// Expression evaluation error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExpressionError {
    #[error("Parse error: {0}")]
    Parse(String),

    /// The root identifier does not exist in the execution data.
    #[error("Unknown identifier: {0}")]
    UnknownIdentifier(String),

    /// A property along a dotted path is missing; carries the full path.
    #[error("Property not found: {0}")]
    PropertyNotFound(String),

    #[error("Invalid index: {0}")]
    InvalidIndex(String),

    #[error("Type error: expected {expected}, got {actual}")]
    Type { expected: String, actual: String },

    /// A resolved parameter failed schema validation.
    #[error("Invalid parameter '{parameter}': {message}")]
    Validation { parameter: String, message: String },

    #[error("Evaluation error: {0}")]
    Evaluation(String),
}

/// Evaluate a single expression against the execution data.
pub fn evaluate(expr: &str, data: &HashMap<String, Value>) -> ExpressionResult<Value> {
    let ast = parser::parse(expr)?;
    Evaluator::new().eval(&ast, data)
}

/// Resolve a node's parameter map against the execution data.
///
/// A parameter is evaluated iff its value is a string wrapped in the
/// `={{ … }}` markers; everything else passes through unchanged, nested
/// structures included.
pub fn resolve_parameters(
    parameters: &ParameterMap,
    data: &HashMap<String, Value>,
) -> ExpressionResult<serde_json::Map<String, Value>> {
    let mut resolved = serde_json::Map::with_capacity(parameters.len());
    for (key, value) in parameters {
        let json = match value.as_expression() {
            Some(body) => evaluate(body, data)?,
            None => value.to_json(),
        };
        resolved.insert(key.clone(), json);
    }
    Ok(resolved)
}
