//! Node executor contract and built-in executors.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use conductor_workflow::{NodeCapabilities, NodeCategory, NodeDefinition};

use crate::context::{ExecutionContext, TRIGGER_KEY, VARS_KEY};
use crate::error::EngineError;

/// Resolved parameters handed to an executor.
pub type ResolvedParameters = serde_json::Map<String, Value>;

/// A unit of work bound to a node type.
///
/// Executors receive their resolved parameter map, the shared execution
/// context and a cancellation token, and produce the node's whole output
/// value. Side effects are not deduplicated across retries; executors that
/// are safe to re-invoke declare `idempotent` in their capabilities.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    /// The node type identifier this executor handles.
    fn node_type(&self) -> &str;

    /// The definition registered for this type.
    fn definition(&self) -> NodeDefinition {
        NodeDefinition::minimal(self.node_type())
    }

    /// Execute the node.
    async fn execute(
        &self,
        parameters: &ResolvedParameters,
        context: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<Value, EngineError>;
}

pub const SET_NODE_TYPE: &str = "conductor.set";
pub const PASSTHROUGH_NODE_TYPE: &str = "conductor.passthrough";
pub const MERGE_NODE_TYPE: &str = "conductor.merge";

/// The built-in executors registered by [`NodeRegistry::with_builtins`].
///
/// [`NodeRegistry::with_builtins`]: crate::registry::NodeRegistry::with_builtins
pub fn builtin_executors() -> Vec<Arc<dyn NodeExecutor>> {
    vec![
        Arc::new(SetExecutor),
        Arc::new(PassthroughExecutor),
        Arc::new(MergeExecutor),
    ]
}

/// Set node: its resolved parameter map is the node output.
pub struct SetExecutor;

#[async_trait]
impl NodeExecutor for SetExecutor {
    fn node_type(&self) -> &str {
        SET_NODE_TYPE
    }

    fn definition(&self) -> NodeDefinition {
        NodeDefinition {
            node_type: SET_NODE_TYPE.to_string(),
            display_name: "Set".to_string(),
            category: NodeCategory::Transform,
            description: "Produce an object from the configured values".to_string(),
            parameters: Vec::new(),
            outputs: vec!["main".to_string()],
            credentials: Vec::new(),
            capabilities: NodeCapabilities {
                supports_retry: true,
                idempotent: true,
                ..NodeCapabilities::default()
            },
        }
    }

    async fn execute(
        &self,
        parameters: &ResolvedParameters,
        _context: &ExecutionContext,
        _cancel: &CancellationToken,
    ) -> Result<Value, EngineError> {
        Ok(Value::Object(parameters.clone()))
    }
}

/// Passthrough node: echoes its `value` parameter, or the trigger payload
/// when no value is configured.
pub struct PassthroughExecutor;

#[async_trait]
impl NodeExecutor for PassthroughExecutor {
    fn node_type(&self) -> &str {
        PASSTHROUGH_NODE_TYPE
    }

    fn definition(&self) -> NodeDefinition {
        NodeDefinition {
            node_type: PASSTHROUGH_NODE_TYPE.to_string(),
            display_name: "Passthrough".to_string(),
            category: NodeCategory::Flow,
            description: "Echo the configured value or the trigger payload".to_string(),
            parameters: Vec::new(),
            outputs: vec!["main".to_string()],
            credentials: Vec::new(),
            capabilities: NodeCapabilities {
                supports_retry: true,
                idempotent: true,
                ..NodeCapabilities::default()
            },
        }
    }

    async fn execute(
        &self,
        parameters: &ResolvedParameters,
        context: &ExecutionContext,
        _cancel: &CancellationToken,
    ) -> Result<Value, EngineError> {
        Ok(parameters
            .get("value")
            .cloned()
            .unwrap_or_else(|| context.trigger()))
    }
}

/// Merge node: collects upstream outputs into one object keyed by node id.
///
/// With a `sources` parameter (array of node ids) only those entries are
/// collected; otherwise every node output present in the context is, the
/// trigger payload and workflow variables excluded.
pub struct MergeExecutor;

#[async_trait]
impl NodeExecutor for MergeExecutor {
    fn node_type(&self) -> &str {
        MERGE_NODE_TYPE
    }

    fn definition(&self) -> NodeDefinition {
        NodeDefinition {
            node_type: MERGE_NODE_TYPE.to_string(),
            display_name: "Merge".to_string(),
            category: NodeCategory::Flow,
            description: "Collect upstream outputs into a single object".to_string(),
            parameters: Vec::new(),
            outputs: vec!["main".to_string()],
            credentials: Vec::new(),
            capabilities: NodeCapabilities {
                supports_retry: true,
                idempotent: true,
                ..NodeCapabilities::default()
            },
        }
    }

    async fn execute(
        &self,
        parameters: &ResolvedParameters,
        context: &ExecutionContext,
        _cancel: &CancellationToken,
    ) -> Result<Value, EngineError> {
        let mut merged = serde_json::Map::new();

        match parameters.get("sources").and_then(Value::as_array) {
            Some(sources) => {
                for source in sources.iter().filter_map(Value::as_str) {
                    if let Some(value) = context.get(source) {
                        merged.insert(source.to_string(), value);
                    }
                }
            }
            None => {
                for (key, value) in context.snapshot() {
                    if key == TRIGGER_KEY || key == VARS_KEY {
                        continue;
                    }
                    merged.insert(key, value);
                }
            }
        }

        Ok(Value::Object(merged))
    }
}
