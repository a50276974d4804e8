//! Error types for the workflow data model.

use thiserror::Error;

/// Errors raised while assembling or validating workflow definitions.
#[derive(Error, Debug, Clone)]
pub enum WorkflowError {
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("Invalid workflow: {0}")]
    InvalidWorkflow(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}
