//! Node blueprints and node type definitions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::data::{ParameterMap, ParameterValue};

/// A workflow node instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique identifier within the workflow definition.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Node type identifier (e.g., "conductor.set").
    #[serde(rename = "type")]
    pub node_type: String,
    /// Configuration parameters; values may be `={{ … }}` expressions.
    #[serde(default)]
    pub parameters: ParameterMap,
    /// Whether the node is skipped during execution.
    #[serde(default)]
    pub disabled: bool,
    /// Retry policy for this node.
    #[serde(default)]
    pub retry: RetrySettings,
    /// Position on the workflow canvas [x, y].
    #[serde(default)]
    pub position: [f64; 2],
}

impl Node {
    /// Create a new node with default settings.
    pub fn new(id: impl Into<String>, name: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            node_type: node_type.into(),
            parameters: ParameterMap::new(),
            disabled: false,
            retry: RetrySettings::default(),
            position: [0.0, 0.0],
        }
    }

    /// Create a node with a generated id.
    pub fn named(name: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self::new(Uuid::new_v4().to_string(), name, node_type)
    }

    /// Set a parameter value.
    pub fn set_parameter(&mut self, key: impl Into<String>, value: ParameterValue) {
        self.parameters.insert(key.into(), value);
    }

    /// Get a parameter value.
    pub fn get_parameter(&self, key: &str) -> Option<&ParameterValue> {
        self.parameters.get(key)
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: ParameterValue) -> Self {
        self.set_parameter(key, value);
        self
    }

    pub fn with_retry(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    pub fn disable(mut self) -> Self {
        self.disabled = true;
        self
    }
}

/// Per-node retry policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RetrySettings {
    /// Whether failed attempts are retried at all.
    #[serde(default)]
    pub enabled: bool,
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Base delay between attempts in milliseconds.
    pub retry_delay_ms: u64,
    /// Double the delay after each failed attempt.
    #[serde(default)]
    pub exponential_backoff: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            max_retries: 3,
            retry_delay_ms: 1000,
            exponential_backoff: false,
        }
    }
}

impl RetrySettings {
    /// Number of retries actually allowed by this policy.
    pub fn effective_retries(&self) -> u32 {
        if self.enabled {
            self.max_retries
        } else {
            0
        }
    }
}

/// Category a node type belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NodeCategory {
    Trigger,
    Transform,
    Flow,
    Output,
    Integration,
}

/// Declared parameter kinds for schema validation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    String,
    Number,
    Boolean,
    Array,
    Object,
    /// Any value is accepted.
    Any,
}

/// Schema entry for a single node parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSchema {
    /// Parameter name/key.
    pub name: String,
    /// Expected kind after expression resolution.
    pub kind: ParameterKind,
    /// Whether the parameter must be present.
    #[serde(default)]
    pub required: bool,
    /// Default applied when the parameter is absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<ParameterValue>,
}

impl ParameterSchema {
    pub fn new(name: impl Into<String>, kind: ParameterKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            default: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: ParameterValue) -> Self {
        self.default = Some(value);
        self
    }
}

/// Declared capabilities of a node type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodeCapabilities {
    /// The executor may safely be re-invoked after a failed attempt.
    #[serde(default)]
    pub supports_retry: bool,
    /// The executor streams partial output (unused by the core scheduler).
    #[serde(default)]
    pub supports_streaming: bool,
    /// The executor can process batched inputs.
    #[serde(default)]
    pub supports_batching: bool,
    /// The node type is an entry-point trigger.
    #[serde(default)]
    pub is_trigger: bool,
    /// Re-running the executor does not duplicate side effects.
    #[serde(default)]
    pub idempotent: bool,
    /// Hard wall-clock limit for a single invocation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_execution_time_seconds: Option<u64>,
}

/// Declarative metadata about a node type, registered once per type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDefinition {
    /// Unique node type identifier.
    pub node_type: String,
    /// Display name.
    pub display_name: String,
    /// Category for registry grouping.
    pub category: NodeCategory,
    /// Description text.
    #[serde(default)]
    pub description: String,
    /// Parameter schema for validation before execution.
    #[serde(default)]
    pub parameters: Vec<ParameterSchema>,
    /// Named outputs this type produces.
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Credential types the executor needs, resolved by the credential
    /// provider outside the core.
    #[serde(default)]
    pub credentials: Vec<String>,
    /// Capability flags.
    #[serde(default)]
    pub capabilities: NodeCapabilities,
}

impl NodeDefinition {
    /// Minimal definition for a type registered without explicit metadata.
    pub fn minimal(node_type: impl Into<String>) -> Self {
        let node_type = node_type.into();
        Self {
            display_name: node_type.clone(),
            node_type,
            category: NodeCategory::Transform,
            description: String::new(),
            parameters: Vec::new(),
            outputs: vec![crate::connection::CONNECTION_MAIN.to_string()],
            credentials: Vec::new(),
            capabilities: NodeCapabilities::default(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: NodeCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_parameters(mut self, parameters: Vec<ParameterSchema>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Default values declared in the schema, keyed by parameter name.
    pub fn parameter_defaults(&self) -> HashMap<String, ParameterValue> {
        self.parameters
            .iter()
            .filter_map(|p| p.default.clone().map(|d| (p.name.clone(), d)))
            .collect()
    }
}
