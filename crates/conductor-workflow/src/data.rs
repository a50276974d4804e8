//! Parameter value types for node configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Marker prefix for expression-encoded parameter values.
pub const EXPRESSION_OPEN: &str = "={{";
/// Marker suffix for expression-encoded parameter values.
pub const EXPRESSION_CLOSE: &str = "}}";

/// A node parameter value as assembled in the editor.
///
/// Parameters are untyped at the boundary; the tagged variant keeps the
/// dynamism without falling back to raw JSON everywhere. A `String` value
/// wrapped in `={{ … }}` markers is treated as an expression and resolved
/// against the execution data before the node runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<ParameterValue>),
    Object(HashMap<String, ParameterValue>),
}

impl ParameterValue {
    /// Wrap an expression body in the `={{ … }}` markers.
    pub fn expression(body: impl AsRef<str>) -> Self {
        ParameterValue::String(format!(
            "{} {} {}",
            EXPRESSION_OPEN,
            body.as_ref().trim(),
            EXPRESSION_CLOSE
        ))
    }

    /// Return the expression body if this value is expression-encoded.
    ///
    /// Only top-level strings qualify; nested structures are never scanned.
    pub fn as_expression(&self) -> Option<&str> {
        match self {
            ParameterValue::String(s)
                if s.starts_with(EXPRESSION_OPEN) && s.ends_with(EXPRESSION_CLOSE) =>
            {
                Some(s[EXPRESSION_OPEN.len()..s.len() - EXPRESSION_CLOSE.len()].trim())
            }
            _ => None,
        }
    }

    /// Convert to a `serde_json::Value`, passing the raw string through for
    /// expression-encoded values.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ParameterValue::Null => serde_json::Value::Null,
            ParameterValue::Bool(b) => serde_json::Value::Bool(*b),
            ParameterValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ParameterValue::String(s) => serde_json::Value::String(s.clone()),
            ParameterValue::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(Self::to_json).collect())
            }
            ParameterValue::Object(obj) => {
                let map: serde_json::Map<String, serde_json::Value> =
                    obj.iter().map(|(k, v)| (k.clone(), v.to_json())).collect();
                serde_json::Value::Object(map)
            }
        }
    }

    /// Convert a `serde_json::Value` back into a parameter value.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => ParameterValue::Null,
            serde_json::Value::Bool(b) => ParameterValue::Bool(*b),
            serde_json::Value::Number(n) => ParameterValue::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => ParameterValue::String(s.clone()),
            serde_json::Value::Array(arr) => {
                ParameterValue::Array(arr.iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(obj) => {
                let map: HashMap<String, ParameterValue> = obj
                    .iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect();
                ParameterValue::Object(map)
            }
        }
    }
}

impl Default for ParameterValue {
    fn default() -> Self {
        ParameterValue::Null
    }
}

impl From<bool> for ParameterValue {
    fn from(v: bool) -> Self {
        ParameterValue::Bool(v)
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        ParameterValue::Number(v)
    }
}

impl From<i64> for ParameterValue {
    fn from(v: i64) -> Self {
        ParameterValue::Number(v as f64)
    }
}

impl From<&str> for ParameterValue {
    fn from(v: &str) -> Self {
        ParameterValue::String(v.to_string())
    }
}

impl From<String> for ParameterValue {
    fn from(v: String) -> Self {
        ParameterValue::String(v)
    }
}

/// Node parameters keyed by name.
pub type ParameterMap = HashMap<String, ParameterValue>;
