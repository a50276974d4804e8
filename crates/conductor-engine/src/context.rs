//! Per-execution runtime context.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use conductor_workflow::{Environment, TriggerMode, WorkflowDefinition};

/// Data key holding the trigger payload.
pub const TRIGGER_KEY: &str = "trigger";

/// Data key holding the workflow variables map.
pub const VARS_KEY: &str = "vars";

/// Engine-level configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Fallback invocation timeout in seconds when a node type declares
    /// none. Zero disables the fallback.
    pub default_timeout_seconds: u64,
    /// Upper bound on concurrently running nodes within one parallel wave.
    pub max_concurrency: usize,
    /// Timezone label for date handling inside executors.
    pub timezone: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_timeout_seconds: 0,
            max_concurrency: 16,
            timezone: "UTC".to_string(),
        }
    }
}

/// Shared state for one workflow execution.
///
/// The data map is keyed by node id (plus [`TRIGGER_KEY`] and [`VARS_KEY`]).
/// Each key is written exactly once, by the runner of the node that produced
/// it; readers are strictly downstream, so distinct-key concurrent inserts
/// are the only concurrent writes.
#[derive(Clone)]
pub struct ExecutionContext {
    /// Owning workflow id.
    pub workflow_id: String,
    /// Owning workflow name.
    pub workflow_name: String,
    /// Execution id this context belongs to.
    pub execution_id: String,
    /// Environment label.
    pub environment: Environment,
    /// How the execution was initiated.
    pub trigger_mode: TriggerMode,
    data: Arc<DashMap<String, Value>>,
    cancel: CancellationToken,
    store_gate: Arc<tokio::sync::Mutex<()>>,
}

impl ExecutionContext {
    pub fn new(
        definition: &WorkflowDefinition,
        execution_id: impl Into<String>,
        trigger_mode: TriggerMode,
        trigger_payload: Value,
        cancel: CancellationToken,
    ) -> Self {
        let data: Arc<DashMap<String, Value>> = Arc::new(DashMap::new());
        data.insert(TRIGGER_KEY.to_string(), trigger_payload);
        if !definition.variables.is_empty() {
            let vars: serde_json::Map<String, Value> = definition
                .variables
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            data.insert(VARS_KEY.to_string(), Value::Object(vars));
        }

        Self {
            workflow_id: definition.id.clone(),
            workflow_name: definition.name.clone(),
            execution_id: execution_id.into(),
            environment: definition.environment,
            trigger_mode,
            data,
            cancel,
            store_gate: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Record a node's output. Called exactly once per node id, the instant
    /// the node reports Success.
    pub fn insert_result(&self, node_id: &str, value: Value) {
        if self.data.insert(node_id.to_string(), value).is_some() {
            warn!(node = %node_id, "node output written more than once");
        }
    }

    /// Get a value from the data map.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.get(key).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// The trigger payload handed in by the caller.
    pub fn trigger(&self) -> Value {
        self.get(TRIGGER_KEY).unwrap_or(Value::Null)
    }

    /// Snapshot the data map for expression resolution.
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.data
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Whether cancellation has been signaled.
    pub fn is_canceled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The cancellation token threaded into executor invocations.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Gate serializing store calls within this execution; stores only see
    /// concurrent calls from different executions.
    pub fn store_gate(&self) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(&self.store_gate)
    }
}
