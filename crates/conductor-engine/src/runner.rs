//! Single-node execution with retry, timeout and cancellation.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use conductor_workflow::{
    ExecutionLog, ExecutionStatus, LogLevel, Node, NodeDefinition, NodeExecutionRecord,
};

use crate::context::{ExecutionContext, RuntimeConfig};
use crate::error::EngineError;
use crate::expression;
use crate::hub::ExecutionHub;
use crate::registry::NodeRegistry;
use crate::storage::ExecutionStore;
use crate::validator;

/// The result of running one node.
pub struct NodeOutcome {
    /// The node's terminal record, already persisted.
    pub record: NodeExecutionRecord,
    /// The executor's return value, or the final error after retries.
    pub result: Result<Value, EngineError>,
}

impl NodeOutcome {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// Runs one node against the current execution context.
///
/// Owns the retry loop and only propagates the final outcome; the engine
/// owns execution-level termination.
#[derive(Clone)]
pub struct NodeRunner {
    registry: Arc<NodeRegistry>,
    hub: Arc<dyn ExecutionHub>,
    store: Arc<dyn ExecutionStore>,
    config: RuntimeConfig,
}

impl NodeRunner {
    pub fn new(
        registry: Arc<NodeRegistry>,
        hub: Arc<dyn ExecutionHub>,
        store: Arc<dyn ExecutionStore>,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            registry,
            hub,
            store,
            config,
        }
    }

    /// Execute a node to its terminal state.
    ///
    /// `execution_order` is the strictly increasing sequence number assigned
    /// by the engine when the node enters Running.
    pub async fn run(
        &self,
        node: &Node,
        context: &ExecutionContext,
        execution_order: u32,
    ) -> NodeOutcome {
        let mut record = NodeExecutionRecord::start(
            &context.execution_id,
            &node.id,
            &node.name,
            execution_order,
        );
        self.persist(context, &record).await;
        self.hub.node_execution_started(&record, Some(node.position));
        debug!(node = %node.name, order = execution_order, "executing node");

        let definition = self.registry.definition(&node.node_type);
        let cancel = context.cancellation_token();
        let max_retries = node.retry.effective_retries();
        let mut delay = Duration::from_millis(node.retry.retry_delay_ms);

        let result = loop {
            match self
                .attempt(node, definition.as_ref(), context, &cancel, &mut record)
                .await
            {
                Ok(value) => break Ok(value),
                Err(e) if !e.is_retryable() => break Err(e),
                Err(e) => {
                    if record.retry_count >= max_retries {
                        break Err(e);
                    }
                    record.retry_count += 1;
                    warn!(
                        node = %node.name,
                        attempt = record.retry_count,
                        error = %e,
                        "node attempt failed, retrying"
                    );
                    self.hub.execution_log(
                        &ExecutionLog::new(
                            &context.execution_id,
                            LogLevel::Warn,
                            format!(
                                "attempt {} failed: {e}; retrying in {}ms",
                                record.retry_count,
                                delay.as_millis()
                            ),
                        )
                        .for_node(&node.id, &node.name),
                    );

                    tokio::select! {
                        _ = cancel.cancelled() => break Err(EngineError::Canceled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    if node.retry.exponential_backoff {
                        delay *= 2;
                    }
                }
            }
        };

        match &result {
            Ok(value) => {
                context.insert_result(&node.id, value.clone());
                record.output_snapshot = serde_json::to_string(value).ok();
                record.finish(ExecutionStatus::Success);
            }
            Err(EngineError::Canceled) => {
                record.error_message = Some(EngineError::Canceled.to_string());
                record.finish(ExecutionStatus::Canceled);
            }
            Err(e) => {
                record.error_message = Some(e.to_string());
                record.finish(ExecutionStatus::Error);
                error!(node = %node.name, error = %e, "node execution failed");
                self.hub.execution_log(
                    &ExecutionLog::new(&context.execution_id, LogLevel::Error, e.to_string())
                        .for_node(&node.id, &node.name),
                );
            }
        }

        self.persist(context, &record).await;
        self.hub.node_execution_completed(&record);
        NodeOutcome { record, result }
    }

    /// One attempt: resolve parameters, validate, invoke the executor.
    async fn attempt(
        &self,
        node: &Node,
        definition: Option<&NodeDefinition>,
        context: &ExecutionContext,
        cancel: &CancellationToken,
        record: &mut NodeExecutionRecord,
    ) -> Result<Value, EngineError> {
        if cancel.is_cancelled() {
            return Err(EngineError::Canceled);
        }

        let data = context.snapshot();
        let mut parameters = expression::resolve_parameters(&node.parameters, &data)?;
        if let Some(definition) = definition {
            validator::apply_defaults(definition, &mut parameters);
            validator::validate_parameters(definition, &parameters)?;
        }
        record.input_snapshot = serde_json::to_string(&parameters).ok();

        let executor = self.registry.get(&node.node_type)?;
        // Per-type limit wins; the engine default applies when none is set.
        let timeout = definition
            .and_then(|d| d.capabilities.max_execution_time_seconds)
            .or_else(|| {
                (self.config.default_timeout_seconds > 0)
                    .then_some(self.config.default_timeout_seconds)
            });

        let invocation = async {
            match timeout {
                Some(seconds) => {
                    match tokio::time::timeout(
                        Duration::from_secs(seconds),
                        executor.execute(&parameters, context, cancel),
                    )
                    .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(EngineError::Timeout {
                            node: node.name.clone(),
                            seconds,
                        }),
                    }
                }
                None => executor.execute(&parameters, context, cancel).await,
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(EngineError::Canceled),
            result = invocation => result,
        }
    }

    /// Persist a node record, serialized against sibling runners so the
    /// store never sees concurrent calls for one execution.
    async fn persist(&self, context: &ExecutionContext, record: &NodeExecutionRecord) {
        let gate = context.store_gate();
        let _guard = gate.lock().await;
        if let Err(e) = self.store.update_node_execution(record).await {
            warn!(
                node = %record.node_name,
                execution_id = %record.execution_id,
                error = %e,
                "failed to persist node execution record"
            );
        }
    }
}
