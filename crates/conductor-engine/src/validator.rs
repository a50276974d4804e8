//! Shared parameter validation against node type schemas.

use serde_json::Value;

use conductor_workflow::{NodeDefinition, ParameterKind};

use crate::executor::ResolvedParameters;
use crate::expression::ExpressionError;

/// Apply schema defaults for absent parameters.
pub fn apply_defaults(definition: &NodeDefinition, parameters: &mut ResolvedParameters) {
    for schema in &definition.parameters {
        if parameters.contains_key(&schema.name) {
            continue;
        }
        if let Some(default) = &schema.default {
            parameters.insert(schema.name.clone(), default.to_json());
        }
    }
}

/// Validate a resolved parameter map against the node type's schema.
///
/// Runs after expression resolution and before the executor is invoked.
/// Violations surface as [`ExpressionError::Validation`], which the runner
/// treats like any other expression failure.
pub fn validate_parameters(
    definition: &NodeDefinition,
    parameters: &ResolvedParameters,
) -> Result<(), ExpressionError> {
    for schema in &definition.parameters {
        match parameters.get(&schema.name) {
            None => {
                if schema.required {
                    return Err(ExpressionError::Validation {
                        parameter: schema.name.clone(),
                        message: "required parameter is missing".to_string(),
                    });
                }
            }
            Some(value) => {
                if !kind_matches(schema.kind, value) {
                    return Err(ExpressionError::Validation {
                        parameter: schema.name.clone(),
                        message: format!(
                            "expected {}, got {}",
                            kind_name(schema.kind),
                            json_type_name(value)
                        ),
                    });
                }
            }
        }
    }
    Ok(())
}

fn kind_matches(kind: ParameterKind, value: &Value) -> bool {
    match kind {
        ParameterKind::Any => true,
        ParameterKind::String => value.is_string(),
        ParameterKind::Number => value.is_number(),
        ParameterKind::Boolean => value.is_boolean(),
        ParameterKind::Array => value.is_array(),
        ParameterKind::Object => value.is_object(),
    }
}

fn kind_name(kind: ParameterKind) -> &'static str {
    match kind {
        ParameterKind::Any => "any",
        ParameterKind::String => "string",
        ParameterKind::Number => "number",
        ParameterKind::Boolean => "boolean",
        ParameterKind::Array => "array",
        ParameterKind::Object => "object",
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_workflow::{ParameterSchema, ParameterValue};
    use serde_json::json;

    fn definition() -> NodeDefinition {
        NodeDefinition::minimal("conductor.test").with_parameters(vec![
            ParameterSchema::new("url", ParameterKind::String).required(),
            ParameterSchema::new("limit", ParameterKind::Number)
                .with_default(ParameterValue::Number(10.0)),
        ])
    }

    #[test]
    fn missing_required_parameter_fails() {
        let err = validate_parameters(&definition(), &ResolvedParameters::new()).unwrap_err();
        assert!(matches!(
            err,
            ExpressionError::Validation { parameter, .. } if parameter == "url"
        ));
    }

    #[test]
    fn kind_mismatch_fails() {
        let mut params = ResolvedParameters::new();
        params.insert("url".to_string(), json!(42));
        let err = validate_parameters(&definition(), &params).unwrap_err();
        assert!(matches!(err, ExpressionError::Validation { .. }));
    }

    #[test]
    fn defaults_fill_absent_parameters() {
        let mut params = ResolvedParameters::new();
        params.insert("url".to_string(), json!("https://example.com"));
        apply_defaults(&definition(), &mut params);
        assert_eq!(params["limit"], json!(10.0));
        assert!(validate_parameters(&definition(), &params).is_ok());
    }

    #[test]
    fn undeclared_parameters_pass_through() {
        let mut params = ResolvedParameters::new();
        params.insert("url".to_string(), json!("https://example.com"));
        params.insert("extra".to_string(), json!(true));
        assert!(validate_parameters(&definition(), &params).is_ok());
    }
}
