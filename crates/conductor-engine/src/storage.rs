//! Execution persistence contract and in-memory backend.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use conductor_workflow::{ExecutionRecord, NodeExecutionRecord};

/// Persistence layer failure. Logged by the engine; never fails the
/// execution.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Repository the engine persists execution state into.
///
/// Called at well-defined lifecycle points: execution start, node end,
/// execution end. Calls for one execution are issued serially; calls for
/// different executions may be concurrent.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Insert a freshly created execution record.
    async fn add(&self, record: &ExecutionRecord) -> Result<(), StoreError>;

    /// Update an execution record in place.
    async fn update(&self, record: &ExecutionRecord) -> Result<(), StoreError>;

    /// Insert or update a node-level subrecord.
    async fn update_node_execution(&self, record: &NodeExecutionRecord) -> Result<(), StoreError>;
}

/// In-memory execution store for tests and development.
#[derive(Default)]
pub struct MemoryExecutionStore {
    executions: RwLock<HashMap<String, ExecutionRecord>>,
    node_executions: RwLock<HashMap<String, Vec<NodeExecutionRecord>>>,
}

impl MemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Get a stored execution record.
    pub async fn get_execution(&self, id: &str) -> Option<ExecutionRecord> {
        self.executions.read().await.get(id).cloned()
    }

    /// Node subrecords for an execution, in insertion order.
    pub async fn get_node_executions(&self, execution_id: &str) -> Vec<NodeExecutionRecord> {
        self.node_executions
            .read()
            .await
            .get(execution_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ExecutionStore for MemoryExecutionStore {
    async fn add(&self, record: &ExecutionRecord) -> Result<(), StoreError> {
        self.executions
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn update(&self, record: &ExecutionRecord) -> Result<(), StoreError> {
        self.executions
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn update_node_execution(&self, record: &NodeExecutionRecord) -> Result<(), StoreError> {
        let mut map = self.node_executions.write().await;
        let records = map.entry(record.execution_id.clone()).or_default();
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }
        Ok(())
    }
}
