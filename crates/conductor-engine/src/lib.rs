//! # conductor-engine
//!
//! Workflow execution engine for conductor: graph planning, node
//! scheduling, expression resolution, retry policy, and live execution
//! telemetry over heterogeneous node types.

pub mod context;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod executor;
pub mod expression;
pub mod graph;
pub mod hub;
pub mod registry;
pub mod runner;
pub mod storage;
pub mod validator;

pub use context::{ExecutionContext, RuntimeConfig, TRIGGER_KEY, VARS_KEY};
pub use credentials::{CredentialData, CredentialError, CredentialProvider, InMemoryCredentialProvider};
pub use engine::WorkflowEngine;
pub use error::EngineError;
pub use executor::{builtin_executors, NodeExecutor, ResolvedParameters};
pub use expression::{evaluate, resolve_parameters, ExpressionError};
pub use graph::ExecutionGraph;
pub use hub::{BroadcastHub, ExecutionEvent, ExecutionHub, NullHub, RecordingHub};
pub use registry::NodeRegistry;
pub use runner::{NodeOutcome, NodeRunner};
pub use storage::{ExecutionStore, MemoryExecutionStore, StoreError};
