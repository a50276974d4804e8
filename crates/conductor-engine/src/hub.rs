//! Execution event hub.
//!
//! The engine and runner report lifecycle changes through the
//! [`ExecutionHub`] trait; implementations fan events out to live
//! subscribers. Delivery is best-effort: a slow, full or absent subscriber
//! never blocks or fails the execution.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::trace;

use conductor_workflow::{
    Environment, ExecutionLog, ExecutionRecord, ExecutionStatus, NodeExecutionRecord, TriggerMode,
};

/// Lifecycle event emitted during workflow execution.
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    ExecutionStarted {
        execution_id: String,
        workflow_id: String,
        started_at: DateTime<Utc>,
        environment: Environment,
        trigger_mode: TriggerMode,
    },
    ExecutionCompleted {
        execution_id: String,
        status: ExecutionStatus,
        finished_at: Option<DateTime<Utc>>,
        nodes_executed: u32,
        nodes_failed: u32,
        total_duration_ms: i64,
        error_message: Option<String>,
    },
    NodeExecutionStarted {
        execution_id: String,
        node_id: String,
        node_name: String,
        execution_order: u32,
        started_at: DateTime<Utc>,
        position: Option<[f64; 2]>,
    },
    NodeExecutionCompleted {
        execution_id: String,
        node_id: String,
        status: ExecutionStatus,
        finished_at: Option<DateTime<Utc>>,
        duration_ms: i64,
        retry_count: u32,
        error_message: Option<String>,
    },
    Log(ExecutionLog),
}

impl ExecutionEvent {
    /// The execution this event belongs to.
    pub fn execution_id(&self) -> &str {
        match self {
            ExecutionEvent::ExecutionStarted { execution_id, .. }
            | ExecutionEvent::ExecutionCompleted { execution_id, .. }
            | ExecutionEvent::NodeExecutionStarted { execution_id, .. }
            | ExecutionEvent::NodeExecutionCompleted { execution_id, .. } => execution_id,
            ExecutionEvent::Log(log) => &log.execution_id,
        }
    }

    fn started(record: &ExecutionRecord) -> Self {
        ExecutionEvent::ExecutionStarted {
            execution_id: record.id.clone(),
            workflow_id: record.workflow_id.clone(),
            started_at: record.started_at,
            environment: record.environment,
            trigger_mode: record.trigger_mode,
        }
    }

    fn completed(record: &ExecutionRecord) -> Self {
        ExecutionEvent::ExecutionCompleted {
            execution_id: record.id.clone(),
            status: record.status,
            finished_at: record.finished_at,
            nodes_executed: record.nodes_executed,
            nodes_failed: record.nodes_failed,
            total_duration_ms: record.duration_ms.unwrap_or(0),
            error_message: record.error_message.clone(),
        }
    }

    fn node_started(record: &NodeExecutionRecord, position: Option<[f64; 2]>) -> Self {
        ExecutionEvent::NodeExecutionStarted {
            execution_id: record.execution_id.clone(),
            node_id: record.node_id.clone(),
            node_name: record.node_name.clone(),
            execution_order: record.execution_order,
            started_at: record.started_at,
            position,
        }
    }

    fn node_completed(record: &NodeExecutionRecord) -> Self {
        ExecutionEvent::NodeExecutionCompleted {
            execution_id: record.execution_id.clone(),
            node_id: record.node_id.clone(),
            status: record.status,
            finished_at: record.finished_at,
            duration_ms: record.duration_ms.unwrap_or(0),
            retry_count: record.retry_count,
            error_message: record.error_message.clone(),
        }
    }
}

/// Sink for execution lifecycle events.
pub trait ExecutionHub: Send + Sync {
    fn execution_started(&self, record: &ExecutionRecord);
    fn execution_completed(&self, record: &ExecutionRecord);
    fn node_execution_started(&self, record: &NodeExecutionRecord, position: Option<[f64; 2]>);
    fn node_execution_completed(&self, record: &NodeExecutionRecord);
    fn execution_log(&self, log: &ExecutionLog);
}

/// Hub that fans events out over tokio broadcast channels, one topic per
/// execution id plus a firehose carrying everything.
pub struct BroadcastHub {
    capacity: usize,
    topics: DashMap<String, broadcast::Sender<ExecutionEvent>>,
    firehose: broadcast::Sender<ExecutionEvent>,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        let (firehose, _) = broadcast::channel(capacity);
        Self {
            capacity,
            topics: DashMap::new(),
            firehose,
        }
    }

    /// Subscribe to a single execution's events. Subscribing before the
    /// execution starts is allowed; the topic is created on first use.
    pub fn subscribe(&self, execution_id: &str) -> broadcast::Receiver<ExecutionEvent> {
        self.topics
            .entry(execution_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Subscribe to every event from every execution.
    pub fn subscribe_all(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.firehose.subscribe()
    }

    fn publish(&self, event: ExecutionEvent) {
        if let Some(topic) = self.topics.get(event.execution_id()) {
            if topic.send(event.clone()).is_err() {
                trace!(execution_id = %event.execution_id(), "no topic subscribers for event");
            }
        }
        if self.firehose.send(event).is_err() {
            trace!("no firehose subscribers for event");
        }
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ExecutionHub for BroadcastHub {
    fn execution_started(&self, record: &ExecutionRecord) {
        self.publish(ExecutionEvent::started(record));
    }

    fn execution_completed(&self, record: &ExecutionRecord) {
        self.publish(ExecutionEvent::completed(record));
        // The topic is no longer needed; existing receivers keep draining
        // what was already sent.
        self.topics.remove(&record.id);
    }

    fn node_execution_started(&self, record: &NodeExecutionRecord, position: Option<[f64; 2]>) {
        self.publish(ExecutionEvent::node_started(record, position));
    }

    fn node_execution_completed(&self, record: &NodeExecutionRecord) {
        self.publish(ExecutionEvent::node_completed(record));
    }

    fn execution_log(&self, log: &ExecutionLog) {
        self.publish(ExecutionEvent::Log(log.clone()));
    }
}

/// Test hub collecting every event in emission order.
#[derive(Default)]
pub struct RecordingHub {
    events: Mutex<Vec<ExecutionEvent>>,
}

impl RecordingHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events recorded so far.
    pub fn events(&self) -> Vec<ExecutionEvent> {
        self.events.lock().clone()
    }

    /// Events for one execution.
    pub fn events_for(&self, execution_id: &str) -> Vec<ExecutionEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.execution_id() == execution_id)
            .cloned()
            .collect()
    }
}

impl ExecutionHub for RecordingHub {
    fn execution_started(&self, record: &ExecutionRecord) {
        self.events.lock().push(ExecutionEvent::started(record));
    }

    fn execution_completed(&self, record: &ExecutionRecord) {
        self.events.lock().push(ExecutionEvent::completed(record));
    }

    fn node_execution_started(&self, record: &NodeExecutionRecord, position: Option<[f64; 2]>) {
        self.events
            .lock()
            .push(ExecutionEvent::node_started(record, position));
    }

    fn node_execution_completed(&self, record: &NodeExecutionRecord) {
        self.events.lock().push(ExecutionEvent::node_completed(record));
    }

    fn execution_log(&self, log: &ExecutionLog) {
        self.events.lock().push(ExecutionEvent::Log(log.clone()));
    }
}

/// Hub that discards everything.
#[derive(Default)]
pub struct NullHub;

impl ExecutionHub for NullHub {
    fn execution_started(&self, _record: &ExecutionRecord) {}
    fn execution_completed(&self, _record: &ExecutionRecord) {}
    fn node_execution_started(&self, _record: &NodeExecutionRecord, _position: Option<[f64; 2]>) {}
    fn node_execution_completed(&self, _record: &NodeExecutionRecord) {}
    fn execution_log(&self, _log: &ExecutionLog) {}
}
