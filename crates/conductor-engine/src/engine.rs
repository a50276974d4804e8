//! Top-level workflow execution driver.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use conductor_workflow::{
    ExecutionMode, ExecutionRecord, ExecutionStatus, Node, TriggerMode, WorkflowDefinition,
};

use crate::context::{ExecutionContext, RuntimeConfig};
use crate::error::EngineError;
use crate::graph::ExecutionGraph;
use crate::hub::ExecutionHub;
use crate::registry::NodeRegistry;
use crate::runner::{NodeOutcome, NodeRunner};
use crate::storage::ExecutionStore;

/// Drives a workflow definition through its execution graph in dependency
/// order, sequentially or in parallel waves.
pub struct WorkflowEngine {
    registry: Arc<NodeRegistry>,
    hub: Arc<dyn ExecutionHub>,
    store: Arc<dyn ExecutionStore>,
    config: RuntimeConfig,
}

impl WorkflowEngine {
    pub fn new(
        registry: Arc<NodeRegistry>,
        hub: Arc<dyn ExecutionHub>,
        store: Arc<dyn ExecutionStore>,
    ) -> Self {
        Self {
            registry,
            hub,
            store,
            config: RuntimeConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Execute a workflow with a fresh cancellation token.
    pub async fn run(&self, workflow: &WorkflowDefinition, trigger: Value) -> ExecutionRecord {
        self.execute(workflow, trigger, CancellationToken::new())
            .await
    }

    /// Execute an already-authorized workflow against a trigger payload.
    ///
    /// Always returns a terminal [`ExecutionRecord`]; failures are reported
    /// through its status rather than an error, and exactly one completion
    /// event is emitted per call.
    pub async fn execute(
        &self,
        workflow: &WorkflowDefinition,
        trigger: Value,
        cancel: CancellationToken,
    ) -> ExecutionRecord {
        self.execute_triggered(workflow, TriggerMode::Manual, trigger, cancel)
            .await
    }

    /// Execute on behalf of an external trigger component.
    pub async fn execute_triggered(
        &self,
        workflow: &WorkflowDefinition,
        trigger_mode: TriggerMode,
        trigger: Value,
        cancel: CancellationToken,
    ) -> ExecutionRecord {
        let mut record = ExecutionRecord::start(
            &workflow.id,
            trigger_mode,
            trigger.clone(),
            workflow.environment,
        );
        if let Err(e) = self.store.add(&record).await {
            warn!(execution_id = %record.id, error = %e, "failed to persist execution record");
        }
        self.hub.execution_started(&record);
        info!(
            execution_id = %record.id,
            workflow_id = %workflow.id,
            mode = ?workflow.execution_mode,
            "workflow execution started"
        );

        // A malformed definition fails the execution before any node runs.
        let graph = match ExecutionGraph::build(workflow) {
            Ok(graph) => graph,
            Err(e) => {
                record.error_message = Some(e.to_string());
                return self.finalize(record, ExecutionStatus::Error).await;
            }
        };

        let context = ExecutionContext::new(
            workflow,
            record.id.clone(),
            trigger_mode,
            trigger,
            cancel.clone(),
        );
        let runner = NodeRunner::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.hub),
            Arc::clone(&self.store),
            self.config.clone(),
        );

        let mut executed: HashSet<String> = HashSet::new();
        let mut order: u32 = 0;
        let mut failure: Option<String> = None;
        let mut canceled = false;
        let mut frontier = graph.roots();

        'waves: while !frontier.is_empty() {
            if cancel.is_cancelled() {
                canceled = true;
                break;
            }

            // Disabled nodes are transparent: consumed for frontier
            // computation, never run, absent from the path.
            let mut enabled: Vec<Node> = Vec::with_capacity(frontier.len());
            for id in &frontier {
                let Some(node) = graph.get(id) else { continue };
                if node.disabled {
                    debug!(node = %node.name, "skipping disabled node");
                    executed.insert(id.clone());
                    record.nodes_skipped += 1;
                } else {
                    enabled.push(node.clone());
                }
            }

            match workflow.execution_mode {
                ExecutionMode::Sequential => {
                    for node in &enabled {
                        let outcome = runner.run(node, &context, order).await;
                        order += 1;
                        match outcome.result {
                            Ok(_) => {
                                executed.insert(node.id.clone());
                                record.execution_path.push(node.id.clone());
                            }
                            Err(EngineError::Canceled) => {
                                canceled = true;
                                break 'waves;
                            }
                            Err(_) => {
                                record.nodes_failed += 1;
                                failure = outcome.record.error_message.clone();
                                break 'waves;
                            }
                        }
                    }
                }
                ExecutionMode::Parallel => {
                    let mut handles = Vec::with_capacity(enabled.len());
                    for node in &enabled {
                        let runner = runner.clone();
                        let context = context.clone();
                        let node = node.clone();
                        let node_order = order;
                        order += 1;
                        handles.push(tokio::spawn(async move {
                            runner.run(&node, &context, node_order).await
                        }));
                    }

                    // The whole wave joins before the outcome is decided;
                    // siblings of a failed node run to completion and keep
                    // their own records, but a failed wave contributes
                    // nothing to the path.
                    let mut wave_successes: Vec<String> = Vec::new();
                    for (node, joined) in enabled.iter().zip(futures::future::join_all(handles).await)
                    {
                        match joined {
                            Ok(NodeOutcome { record: node_record, result }) => match result {
                                Ok(_) => wave_successes.push(node.id.clone()),
                                Err(EngineError::Canceled) => canceled = true,
                                Err(_) => {
                                    record.nodes_failed += 1;
                                    if failure.is_none() {
                                        failure = node_record.error_message.clone();
                                    }
                                }
                            },
                            Err(join_error) => {
                                record.nodes_failed += 1;
                                if failure.is_none() {
                                    failure = Some(format!("node task failed: {join_error}"));
                                }
                            }
                        }
                    }

                    if canceled || failure.is_some() {
                        break 'waves;
                    }
                    for id in wave_successes {
                        executed.insert(id.clone());
                        record.execution_path.push(id);
                    }
                }
            }

            frontier = graph.next(&executed);
        }

        if failure.is_some() {
            record.error_message = failure;
        }
        let status = if canceled {
            ExecutionStatus::Canceled
        } else if record.error_message.is_some() {
            ExecutionStatus::Error
        } else {
            ExecutionStatus::Success
        };
        self.finalize(record, status).await
    }

    /// Stamp the terminal status, persist, and emit the single completion
    /// event.
    async fn finalize(
        &self,
        mut record: ExecutionRecord,
        status: ExecutionStatus,
    ) -> ExecutionRecord {
        record.nodes_executed = record.execution_path.len() as u32;
        record.finish(status);
        if let Err(e) = self.store.update(&record).await {
            warn!(execution_id = %record.id, error = %e, "failed to persist execution record");
        }
        self.hub.execution_completed(&record);
        info!(
            execution_id = %record.id,
            status = record.status.as_str(),
            executed = record.nodes_executed,
            failed = record.nodes_failed,
            "workflow execution finished"
        );
        record
    }
}
