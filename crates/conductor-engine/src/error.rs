//! Error types for the execution engine.

use thiserror::Error;

use crate::expression::ExpressionError;
use crate::storage::StoreError;

/// Errors that can occur during workflow execution.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The definition violates a structural invariant (cycle, dangling
    /// edge, duplicate id). Fatal before any node runs.
    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    /// The node type is not registered. Fatal to the node, no retry.
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    /// A parameter expression could not be evaluated or validated.
    #[error("Expression error: {0}")]
    Expression(#[from] ExpressionError),

    /// The executor reported a failure.
    #[error("Node execution error in '{node}': {message}")]
    NodeExecution { node: String, message: String },

    /// The executor exceeded its configured time limit.
    #[error("Node '{node}' timed out after {seconds}s")]
    Timeout { node: String, seconds: u64 },

    /// Cancellation was signaled; never retried.
    #[error("Execution was canceled")]
    Canceled,

    /// The persistence layer failed. Logged; never fails the execution.
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Whether the node retry policy applies to this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Expression(_)
                | EngineError::NodeExecution { .. }
                | EngineError::Timeout { .. }
        )
    }
}
