//! Execution records and status types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::workflow::{Environment, TriggerMode};

/// Lifecycle status shared by executions and node executions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    #[default]
    Waiting,
    Running,
    Success,
    Error,
    Canceled,
    /// Reserved; the core never produces it.
    PartialSuccess,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Success
                | ExecutionStatus::Error
                | ExecutionStatus::Canceled
                | ExecutionStatus::PartialSuccess
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Waiting => "waiting",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Success => "success",
            ExecutionStatus::Error => "error",
            ExecutionStatus::Canceled => "canceled",
            ExecutionStatus::PartialSuccess => "partial_success",
        }
    }
}

/// The lifecycle record of one workflow execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    /// Unique execution identifier.
    pub id: String,
    /// Workflow this execution belongs to.
    pub workflow_id: String,
    /// Current status; terminal exactly once.
    pub status: ExecutionStatus,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// Finish time, set when the status becomes terminal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// How the execution was initiated.
    pub trigger_mode: TriggerMode,
    /// Payload handed in by the trigger.
    pub trigger_payload: serde_json::Value,
    /// Environment label at execution time.
    pub environment: Environment,
    /// Ordered ids of nodes that reached Success.
    pub execution_path: Vec<String>,
    /// Nodes that ran to Success.
    pub nodes_executed: u32,
    /// Disabled nodes skipped over.
    pub nodes_skipped: u32,
    /// Nodes that terminally failed.
    pub nodes_failed: u32,
    /// Total wall-clock duration in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    /// Message of the first failing node, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ExecutionRecord {
    /// Allocate a new Running record for a workflow.
    pub fn start(
        workflow_id: impl Into<String>,
        trigger_mode: TriggerMode,
        trigger_payload: serde_json::Value,
        environment: Environment,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            workflow_id: workflow_id.into(),
            status: ExecutionStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            trigger_mode,
            trigger_payload,
            environment,
            execution_path: Vec::new(),
            nodes_executed: 0,
            nodes_skipped: 0,
            nodes_failed: 0,
            duration_ms: None,
            error_message: None,
        }
    }

    /// Transition to a terminal status, stamping finish time and duration.
    pub fn finish(&mut self, status: ExecutionStatus) {
        debug_assert!(status.is_terminal());
        let now = Utc::now();
        self.status = status;
        self.finished_at = Some(now);
        self.duration_ms = Some((now - self.started_at).num_milliseconds());
    }
}

/// The lifecycle record of one node execution within an execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeExecutionRecord {
    /// Unique record identifier.
    pub id: String,
    /// Owning execution.
    pub execution_id: String,
    /// Node id within the workflow definition.
    pub node_id: String,
    /// Node display name.
    pub node_name: String,
    /// Current status.
    pub status: ExecutionStatus,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// Finish time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Resolved parameter map, serialized.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_snapshot: Option<String>,
    /// Executor return value, serialized.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_snapshot: Option<String>,
    /// Error message on terminal failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Strictly increasing order of the Running transition within the
    /// execution.
    pub execution_order: u32,
    /// Retries consumed; never exceeds the configured maximum.
    pub retry_count: u32,
    /// Wall-clock duration in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
}

impl NodeExecutionRecord {
    /// Create a Running record for a node about to execute.
    pub fn start(
        execution_id: impl Into<String>,
        node_id: impl Into<String>,
        node_name: impl Into<String>,
        execution_order: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            execution_id: execution_id.into(),
            node_id: node_id.into(),
            node_name: node_name.into(),
            status: ExecutionStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            input_snapshot: None,
            output_snapshot: None,
            error_message: None,
            execution_order,
            retry_count: 0,
            duration_ms: None,
        }
    }

    /// Transition to a terminal status, stamping finish time and duration.
    pub fn finish(&mut self, status: ExecutionStatus) {
        debug_assert!(status.is_terminal());
        let now = Utc::now();
        self.status = status;
        self.finished_at = Some(now);
        self.duration_ms = Some((now - self.started_at).num_milliseconds());
    }
}

/// Severity of an execution log line.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// An append-only log line attached to an execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionLog {
    pub id: String,
    pub execution_id: String,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl ExecutionLog {
    pub fn new(execution_id: impl Into<String>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            execution_id: execution_id.into(),
            timestamp: Utc::now(),
            level,
            message: message.into(),
            node_id: None,
            node_name: None,
            metadata: None,
        }
    }

    pub fn for_node(mut self, node_id: impl Into<String>, node_name: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self.node_name = Some(node_name.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
