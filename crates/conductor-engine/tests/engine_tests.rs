//! End-to-end tests for the workflow execution engine.
//!
//! These tests drive whole workflows through the engine and assert on the
//! terminal execution record, the persisted node records, and the event
//! stream collected by a recording hub.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use conductor_engine::{
    EngineError, ExecutionContext, ExecutionEvent, ExecutionStore, MemoryExecutionStore,
    NodeExecutor, NodeRegistry, RecordingHub, ResolvedParameters, StoreError, WorkflowEngine,
};
use conductor_workflow::{
    ExecutionMode, ExecutionRecord, ExecutionStatus, Node, NodeCapabilities, NodeDefinition,
    NodeExecutionRecord, ParameterValue, RetrySettings, WorkflowDefinition,
};

// ============================================================================
// Helpers
// ============================================================================

struct Harness {
    engine: Arc<WorkflowEngine>,
    hub: Arc<RecordingHub>,
    store: Arc<MemoryExecutionStore>,
}

/// Engine wired to a recording hub and an in-memory store, with the
/// built-in executors plus any test stubs registered.
fn harness_with(extra: Vec<Arc<dyn NodeExecutor>>) -> Harness {
    let registry = Arc::new(NodeRegistry::with_builtins());
    registry.register_many(extra);
    let hub = Arc::new(RecordingHub::new());
    let store = Arc::new(MemoryExecutionStore::new());
    let engine = Arc::new(WorkflowEngine::new(
        registry,
        hub.clone(),
        store.clone(),
    ));
    Harness { engine, hub, store }
}

fn harness() -> Harness {
    harness_with(Vec::new())
}

/// Create a workflow from nodes and `(source, target)` edge pairs.
fn workflow(name: &str, nodes: Vec<Node>, edges: &[(&str, &str)]) -> WorkflowDefinition {
    let mut wf = WorkflowDefinition::new(name);
    for node in nodes {
        wf.add_node(node);
    }
    for &(source, target) in edges {
        wf.connect(source, target)
            .unwrap_or_else(|e| panic!("failed to connect {source} -> {target}: {e}"));
    }
    wf
}

/// A Set node with the given parameters; the node name is the uppercased id.
fn set_node(id: &str, values: &[(&str, ParameterValue)]) -> Node {
    let mut node = Node::new(id, id.to_uppercase(), "conductor.set");
    for (key, value) in values {
        node.set_parameter(*key, value.clone());
    }
    node
}

fn retry_settings(max_retries: u32, delay_ms: u64, exponential: bool) -> RetrySettings {
    RetrySettings {
        enabled: true,
        max_retries,
        retry_delay_ms: delay_ms,
        exponential_backoff: exponential,
    }
}

fn node_records_by_id(records: &[NodeExecutionRecord], node_id: &str) -> Vec<NodeExecutionRecord> {
    records
        .iter()
        .filter(|r| r.node_id == node_id)
        .cloned()
        .collect()
}

fn started_index(events: &[ExecutionEvent], id: &str) -> Option<usize> {
    events.iter().position(
        |e| matches!(e, ExecutionEvent::NodeExecutionStarted { node_id, .. } if node_id == id),
    )
}

fn completed_index(events: &[ExecutionEvent], id: &str) -> Option<usize> {
    events.iter().position(
        |e| matches!(e, ExecutionEvent::NodeExecutionCompleted { node_id, .. } if node_id == id),
    )
}

fn output_of(record: &NodeExecutionRecord) -> Value {
    serde_json::from_str(record.output_snapshot.as_deref().expect("output snapshot"))
        .expect("valid snapshot json")
}

// ============================================================================
// Stub executors
// ============================================================================

/// Fails the first `fail_times` invocations, then succeeds.
struct FlakyExecutor {
    fail_times: u32,
    calls: AtomicU32,
}

impl FlakyExecutor {
    fn new(fail_times: u32) -> Self {
        Self {
            fail_times,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl NodeExecutor for FlakyExecutor {
    fn node_type(&self) -> &str {
        "test.flaky"
    }

    async fn execute(
        &self,
        _parameters: &ResolvedParameters,
        _context: &ExecutionContext,
        _cancel: &CancellationToken,
    ) -> Result<Value, EngineError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_times {
            Err(EngineError::NodeExecution {
                node: "flaky".to_string(),
                message: "transient failure".to_string(),
            })
        } else {
            Ok(json!({ "attempt": call + 1 }))
        }
    }
}

/// Always fails with a fixed message.
struct AlwaysFailExecutor;

#[async_trait]
impl NodeExecutor for AlwaysFailExecutor {
    fn node_type(&self) -> &str {
        "test.alwaysfail"
    }

    async fn execute(
        &self,
        _parameters: &ResolvedParameters,
        _context: &ExecutionContext,
        _cancel: &CancellationToken,
    ) -> Result<Value, EngineError> {
        Err(EngineError::NodeExecution {
            node: "alwaysfail".to_string(),
            message: "boom from stub".to_string(),
        })
    }
}

/// Sleeps far past its declared time limit.
struct SlowExecutor;

#[async_trait]
impl NodeExecutor for SlowExecutor {
    fn node_type(&self) -> &str {
        "test.slow"
    }

    fn definition(&self) -> NodeDefinition {
        NodeDefinition::minimal(self.node_type()).with_capabilities(NodeCapabilities {
            max_execution_time_seconds: Some(1),
            ..NodeCapabilities::default()
        })
    }

    async fn execute(
        &self,
        _parameters: &ResolvedParameters,
        _context: &ExecutionContext,
        _cancel: &CancellationToken,
    ) -> Result<Value, EngineError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(Value::Null)
    }
}

/// Store whose writes always fail.
struct BrokenStore;

#[async_trait]
impl ExecutionStore for BrokenStore {
    async fn add(&self, _record: &ExecutionRecord) -> Result<(), StoreError> {
        Err(StoreError::Backend("disk on fire".to_string()))
    }

    async fn update(&self, _record: &ExecutionRecord) -> Result<(), StoreError> {
        Err(StoreError::Backend("disk on fire".to_string()))
    }

    async fn update_node_execution(
        &self,
        _record: &NodeExecutionRecord,
    ) -> Result<(), StoreError> {
        Err(StoreError::Backend("disk on fire".to_string()))
    }
}

// ============================================================================
// Scenarios
// ============================================================================

/// Linear chain A -> B -> C of Set nodes wired together with expressions.
/// The chain compounds the value: A sets 1, B computes A+1, C computes B*10.
#[tokio::test]
async fn linear_chain_succeeds_with_expressions() {
    let h = harness();
    let wf = workflow(
        "linear",
        vec![
            set_node("a", &[("value", ParameterValue::Number(1.0))]),
            set_node("b", &[("value", ParameterValue::expression("a.value + 1"))]),
            set_node("c", &[("value", ParameterValue::expression("b.value * 10"))]),
        ],
        &[("a", "b"), ("b", "c")],
    );

    let record = h.engine.run(&wf, json!({})).await;

    assert_eq!(record.status, ExecutionStatus::Success);
    assert_eq!(record.execution_path, vec!["a", "b", "c"]);
    assert_eq!(record.nodes_executed, 3);
    assert_eq!(record.nodes_failed, 0);
    assert!(record.error_message.is_none());

    let node_records = h.store.get_node_executions(&record.id).await;
    let c = &node_records_by_id(&node_records, "c")[0];
    assert_eq!(output_of(c), json!({ "value": 20 }));

    // Totals reconcile with the persisted record.
    let stored = h.store.get_execution(&record.id).await.unwrap();
    assert_eq!(stored.nodes_executed, 3);
    assert_eq!(stored.status, ExecutionStatus::Success);
}

/// Every execution emits exactly one Started and one Completed event, in
/// that order, and every run node gets exactly one Started/Completed pair.
#[tokio::test]
async fn event_stream_pairs_up() {
    let h = harness();
    let wf = workflow(
        "events",
        vec![set_node("a", &[]), set_node("b", &[])],
        &[("a", "b")],
    );

    let record = h.engine.run(&wf, json!({})).await;
    let events = h.hub.events_for(&record.id);

    let started: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, ExecutionEvent::ExecutionStarted { .. }))
        .collect();
    let completed: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, ExecutionEvent::ExecutionCompleted { .. }))
        .collect();
    assert_eq!(started.len(), 1);
    assert_eq!(completed.len(), 1);
    assert!(matches!(events.first(), Some(ExecutionEvent::ExecutionStarted { .. })));
    assert!(matches!(events.last(), Some(ExecutionEvent::ExecutionCompleted { .. })));

    for id in ["a", "b"] {
        let s = started_index(&events, id).unwrap_or_else(|| panic!("no start event for {id}"));
        let c = completed_index(&events, id).unwrap_or_else(|| panic!("no completion for {id}"));
        assert!(s < c, "start of {id} must precede its completion");
    }
}

/// Diamond a -> (b, c) -> d in parallel mode. Both middle nodes complete
/// before d starts; the path has a first and d last.
#[tokio::test]
async fn parallel_diamond_orders_waves() {
    let h = harness();
    let mut wf = workflow(
        "diamond",
        vec![
            set_node("a", &[("seed", ParameterValue::Number(1.0))]),
            set_node("b", &[("left", ParameterValue::expression("a.seed + 1"))]),
            set_node("c", &[("right", ParameterValue::expression("a.seed + 2"))]),
            set_node("d", &[("total", ParameterValue::expression("b.left + c.right"))]),
        ],
        &[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")],
    );
    wf.execution_mode = ExecutionMode::Parallel;

    let record = h.engine.run(&wf, json!({})).await;

    assert_eq!(record.status, ExecutionStatus::Success);
    assert_eq!(record.execution_path.len(), 4);
    assert_eq!(record.execution_path.first().map(String::as_str), Some("a"));
    assert_eq!(record.execution_path.last().map(String::as_str), Some("d"));

    let events = h.hub.events_for(&record.id);
    let d_started = started_index(&events, "d").unwrap();
    assert!(completed_index(&events, "b").unwrap() < d_started);
    assert!(completed_index(&events, "c").unwrap() < d_started);

    // d saw both upstream outputs.
    let node_records = h.store.get_node_executions(&record.id).await;
    let d = &node_records_by_id(&node_records, "d")[0];
    assert_eq!(output_of(d), json!({ "total": 5 }));

    // execution_order is strictly increasing and unique across the run.
    let mut orders: Vec<u32> = node_records.iter().map(|r| r.execution_order).collect();
    orders.sort_unstable();
    orders.dedup();
    assert_eq!(orders.len(), node_records.len());
}

/// A node failing twice with exponential backoff succeeds on the third
/// attempt; the retry count reflects two consumed retries and the delays
/// add up to 10ms + 20ms.
#[tokio::test(start_paused = true)]
async fn retry_then_success() {
    let h = harness_with(vec![Arc::new(FlakyExecutor::new(2))]);
    let mut node = Node::new("x", "X", "test.flaky");
    node.retry = retry_settings(3, 10, true);
    let wf = workflow("flaky", vec![node], &[]);

    let started = tokio::time::Instant::now();
    let record = h.engine.run(&wf, json!({})).await;
    let elapsed = started.elapsed();

    assert_eq!(record.status, ExecutionStatus::Success);

    let node_records = h.store.get_node_executions(&record.id).await;
    let x = &node_records_by_id(&node_records, "x")[0];
    assert_eq!(x.status, ExecutionStatus::Success);
    assert_eq!(x.retry_count, 2);
    assert_eq!(output_of(x), json!({ "attempt": 3 }));

    // Two backoff sleeps: 10ms then 20ms.
    assert!(elapsed >= Duration::from_millis(30), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(40), "elapsed {elapsed:?}");
}

/// A node exhausting its retries fails the execution; the retry count ends
/// at the configured maximum and downstream nodes never start.
#[tokio::test(start_paused = true)]
async fn retry_exhaustion_fails_execution() {
    let h = harness_with(vec![Arc::new(AlwaysFailExecutor)]);
    let mut failing = Node::new("x", "X", "test.alwaysfail");
    failing.retry = retry_settings(2, 5, false);
    let wf = workflow(
        "exhausted",
        vec![failing, set_node("after", &[])],
        &[("x", "after")],
    );

    let record = h.engine.run(&wf, json!({})).await;

    assert_eq!(record.status, ExecutionStatus::Error);
    assert_eq!(record.nodes_failed, 1);
    assert_eq!(record.nodes_executed, 0);
    assert!(record.execution_path.is_empty());

    let node_records = h.store.get_node_executions(&record.id).await;
    let x = &node_records_by_id(&node_records, "x")[0];
    assert_eq!(x.status, ExecutionStatus::Error);
    assert_eq!(x.retry_count, 2);
    assert!(x.error_message.as_deref().unwrap().contains("boom from stub"));
    assert_eq!(record.error_message, x.error_message);

    // Downstream never started.
    assert!(node_records_by_id(&node_records, "after").is_empty());
    let events = h.hub.events_for(&record.id);
    assert!(started_index(&events, "after").is_none());
}

/// Disabled nodes are transparent: dependents treat them as satisfied, no
/// record or events exist for them, and they are absent from the path.
#[tokio::test]
async fn disabled_node_is_transparent() {
    let h = harness();
    let wf = workflow(
        "disabled",
        vec![
            set_node("a", &[("v", ParameterValue::Number(1.0))]),
            set_node("b", &[]).disable(),
            set_node("c", &[("w", ParameterValue::Number(2.0))]),
        ],
        &[("a", "b"), ("b", "c")],
    );

    let record = h.engine.run(&wf, json!({})).await;

    assert_eq!(record.status, ExecutionStatus::Success);
    assert_eq!(record.execution_path, vec!["a", "c"]);
    assert_eq!(record.nodes_executed, 2);
    assert_eq!(record.nodes_skipped, 1);

    let node_records = h.store.get_node_executions(&record.id).await;
    assert!(node_records_by_id(&node_records, "b").is_empty());
    let events = h.hub.events_for(&record.id);
    assert!(started_index(&events, "b").is_none());
}

/// A definition with a cycle fails before any node event is emitted.
#[tokio::test]
async fn cycle_is_rejected_before_any_node_runs() {
    let h = harness();
    let mut wf = workflow(
        "cyclic",
        vec![set_node("a", &[]), set_node("b", &[])],
        &[("a", "b")],
    );
    wf.connections
        .push(conductor_workflow::Connection::main("b", "a"));

    let record = h.engine.run(&wf, json!({})).await;

    assert_eq!(record.status, ExecutionStatus::Error);
    assert!(record.error_message.as_deref().unwrap().contains("cycle"));

    let events = h.hub.events_for(&record.id);
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], ExecutionEvent::ExecutionStarted { .. }));
    assert!(matches!(events[1], ExecutionEvent::ExecutionCompleted { .. }));
}

/// Cancellation signaled during the inter-retry sleep terminates the
/// execution as Canceled without further attempts.
#[tokio::test(start_paused = true)]
async fn cancellation_during_retry_sleep() {
    let h = harness_with(vec![Arc::new(AlwaysFailExecutor)]);
    let mut node = Node::new("x", "X", "test.alwaysfail");
    node.retry = retry_settings(3, 5_000, false);
    let wf = workflow("cancel", vec![node], &[]);

    let cancel = CancellationToken::new();
    let handle = tokio::spawn({
        let engine = h.engine.clone();
        let wf = wf.clone();
        let cancel = cancel.clone();
        async move { engine.execute(&wf, json!({}), cancel).await }
    });

    // Let the first attempt fail and the retry sleep begin.
    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    let record = handle.await.unwrap();
    assert_eq!(record.status, ExecutionStatus::Canceled);

    let node_records = h.store.get_node_executions(&record.id).await;
    let x = &node_records_by_id(&node_records, "x")[0];
    assert_eq!(x.status, ExecutionStatus::Canceled);
    // Only the first attempt ran; no retry was consumed by cancellation.
    assert!(x.retry_count <= 1);

    let completions: Vec<_> = h
        .hub
        .events_for(&record.id)
        .into_iter()
        .filter(|e| matches!(e, ExecutionEvent::ExecutionCompleted { .. }))
        .collect();
    assert_eq!(completions.len(), 1);
}

// ============================================================================
// Additional properties
// ============================================================================

/// The trigger payload is recoverable verbatim through the run.
#[tokio::test]
async fn trigger_round_trips_through_context() {
    let h = harness();
    let wf = workflow(
        "trigger",
        vec![Node::new("echo", "Echo", "conductor.passthrough")],
        &[],
    );
    let payload = json!({ "order": 42, "tags": ["a", "b"] });

    let record = h.engine.run(&wf, payload.clone()).await;

    assert_eq!(record.status, ExecutionStatus::Success);
    assert_eq!(record.trigger_payload, payload);

    let node_records = h.store.get_node_executions(&record.id).await;
    assert_eq!(output_of(&node_records[0]), payload);
}

/// An unregistered node type fails the node without consuming retries.
#[tokio::test]
async fn unknown_node_type_is_not_retried() {
    let h = harness();
    let mut node = Node::new("x", "X", "conductor.ghost");
    node.retry = retry_settings(5, 1, false);
    let wf = workflow("ghost", vec![node], &[]);

    let record = h.engine.run(&wf, json!({})).await;

    assert_eq!(record.status, ExecutionStatus::Error);
    assert!(record
        .error_message
        .as_deref()
        .unwrap()
        .contains("conductor.ghost"));

    let node_records = h.store.get_node_executions(&record.id).await;
    assert_eq!(node_records[0].retry_count, 0);
}

/// An unresolvable expression fails the node with the offending path.
#[tokio::test]
async fn expression_error_fails_node() {
    let h = harness();
    let wf = workflow(
        "badexpr",
        vec![set_node("a", &[("v", ParameterValue::expression("ghost.value"))])],
        &[],
    );

    let record = h.engine.run(&wf, json!({})).await;

    assert_eq!(record.status, ExecutionStatus::Error);
    assert!(record.error_message.as_deref().unwrap().contains("ghost"));
}

/// An executor exceeding its declared time limit fails with a timeout.
#[tokio::test(start_paused = true)]
async fn timeout_is_enforced() {
    let h = harness_with(vec![Arc::new(SlowExecutor)]);
    let wf = workflow("slow", vec![Node::new("s", "S", "test.slow")], &[]);

    let record = h.engine.run(&wf, json!({})).await;

    assert_eq!(record.status, ExecutionStatus::Error);
    assert!(record.error_message.as_deref().unwrap().contains("timed out"));
}

/// In a failed parallel wave the surviving sibling keeps its own record,
/// but its id is not appended to the execution path.
#[tokio::test]
async fn parallel_sibling_outcome_recorded_but_not_pathed() {
    let h = harness_with(vec![Arc::new(AlwaysFailExecutor)]);
    let mut wf = workflow(
        "half-failed",
        vec![
            set_node("a", &[]),
            Node::new("b", "B", "test.alwaysfail"),
            set_node("c", &[]),
            set_node("d", &[]),
        ],
        &[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")],
    );
    wf.execution_mode = ExecutionMode::Parallel;

    let record = h.engine.run(&wf, json!({})).await;

    assert_eq!(record.status, ExecutionStatus::Error);
    assert_eq!(record.nodes_failed, 1);
    assert_eq!(record.execution_path, vec!["a"]);

    let node_records = h.store.get_node_executions(&record.id).await;
    // c ran to completion and kept its Success record.
    let c = &node_records_by_id(&node_records, "c")[0];
    assert_eq!(c.status, ExecutionStatus::Success);
    // d never started.
    assert!(node_records_by_id(&node_records, "d").is_empty());
}

/// Store failures are logged and swallowed; the execution's outcome
/// reflects node results, not persistence health.
#[tokio::test]
async fn broken_store_does_not_fail_execution() {
    let registry = Arc::new(NodeRegistry::with_builtins());
    let hub = Arc::new(RecordingHub::new());
    let engine = WorkflowEngine::new(registry, hub.clone(), Arc::new(BrokenStore));

    let wf = workflow(
        "storeless",
        vec![set_node("a", &[]), set_node("b", &[])],
        &[("a", "b")],
    );
    let record = engine.run(&wf, json!({})).await;

    assert_eq!(record.status, ExecutionStatus::Success);
    assert_eq!(record.nodes_executed, 2);
    // The event stream is unaffected by the broken store.
    assert!(matches!(
        hub.events_for(&record.id).last(),
        Some(ExecutionEvent::ExecutionCompleted { .. })
    ));
}
