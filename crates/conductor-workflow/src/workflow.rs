//! Workflow definition types.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use uuid::Uuid;

use crate::connection::Connection;
use crate::error::WorkflowError;
use crate::node::Node;

/// How nodes within one wave are scheduled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Sequential,
    Parallel,
}

/// Deployment environment label, propagated onto execution records and
/// otherwise opaque to the core.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Testing,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Testing => "testing",
            Environment::Production => "production",
        }
    }
}

/// How an execution was initiated. The core only stamps this onto the
/// record; values other than `Manual` come from external trigger components.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMode {
    #[default]
    Manual,
    Webhook,
    Schedule,
    Event,
}

impl TriggerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerMode::Manual => "manual",
            TriggerMode::Webhook => "webhook",
            TriggerMode::Schedule => "schedule",
            TriggerMode::Event => "event",
        }
    }
}

/// A workflow definition: a DAG of typed nodes with parameters.
///
/// Immutable for the duration of a run; the engine never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    /// Unique workflow identifier.
    pub id: String,
    /// Workflow name.
    pub name: String,
    /// Optional description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Workflow nodes.
    pub nodes: Vec<Node>,
    /// Directed edges between nodes.
    pub connections: Vec<Connection>,
    /// Workflow-level variables available to expressions.
    #[serde(default)]
    pub variables: HashMap<String, serde_json::Value>,
    /// Wave scheduling mode.
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    /// Environment label.
    #[serde(default)]
    pub environment: Environment,
}

impl WorkflowDefinition {
    /// Create a new empty workflow.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: None,
            nodes: Vec::new(),
            connections: Vec::new(),
            variables: HashMap::new(),
            execution_mode: ExecutionMode::default(),
            environment: Environment::default(),
        }
    }

    /// Add a node to the workflow.
    pub fn add_node(&mut self, node: Node) {
        self.nodes.push(node);
    }

    /// Get a node by id.
    pub fn get_node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Connect two nodes by id over the `main` ports.
    pub fn connect(&mut self, source: &str, target: &str) -> Result<(), WorkflowError> {
        if self.get_node(source).is_none() {
            return Err(WorkflowError::NodeNotFound(source.to_string()));
        }
        if self.get_node(target).is_none() {
            return Err(WorkflowError::NodeNotFound(target.to_string()));
        }
        self.connections.push(Connection::main(source, target));
        Ok(())
    }

    /// All node ids in definition order.
    pub fn node_ids(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.id.as_str()).collect()
    }

    /// Validate the workflow structure.
    ///
    /// Rejects duplicate node ids, connections to missing nodes, self-loops
    /// and cycles. The engine performs the same checks when it builds the
    /// execution graph; this entry point lets callers fail fast at
    /// definition time.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        let mut ids = HashSet::new();
        for node in &self.nodes {
            if !ids.insert(node.id.as_str()) {
                return Err(WorkflowError::DuplicateNode(node.id.clone()));
            }
        }

        for conn in &self.connections {
            if !ids.contains(conn.source.as_str()) {
                return Err(WorkflowError::NodeNotFound(conn.source.clone()));
            }
            if !ids.contains(conn.target.as_str()) {
                return Err(WorkflowError::NodeNotFound(conn.target.clone()));
            }
            if conn.source == conn.target {
                return Err(WorkflowError::InvalidWorkflow(format!(
                    "self-loop on node '{}'",
                    conn.source
                )));
            }
        }

        // Kahn's algorithm; leftovers mean a cycle.
        let mut in_degree: HashMap<&str, usize> =
            self.nodes.iter().map(|n| (n.id.as_str(), 0)).collect();
        for conn in &self.connections {
            *in_degree.get_mut(conn.target.as_str()).unwrap() += 1;
        }

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&id, _)| id)
            .collect();
        let mut seen = 0usize;

        while let Some(id) = queue.pop_front() {
            seen += 1;
            for conn in self.connections.iter().filter(|c| c.source == id) {
                let deg = in_degree.get_mut(conn.target.as_str()).unwrap();
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(conn.target.as_str());
                }
            }
        }

        if seen != self.nodes.len() {
            return Err(WorkflowError::InvalidWorkflow(
                "workflow contains a cycle".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for creating workflows.
pub struct WorkflowBuilder {
    workflow: WorkflowDefinition,
}

impl WorkflowBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            workflow: WorkflowDefinition::new(name),
        }
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.workflow.description = Some(desc.into());
        self
    }

    pub fn node(mut self, node: Node) -> Self {
        self.workflow.add_node(node);
        self
    }

    pub fn connect(mut self, source: &str, target: &str) -> Result<Self, WorkflowError> {
        self.workflow.connect(source, target)?;
        Ok(self)
    }

    pub fn execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.workflow.execution_mode = mode;
        self
    }

    pub fn environment(mut self, environment: Environment) -> Self {
        self.workflow.environment = environment;
        self
    }

    pub fn variable(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.workflow.variables.insert(key.into(), value);
        self
    }

    pub fn build(self) -> Result<WorkflowDefinition, WorkflowError> {
        self.workflow.validate()?;
        Ok(self.workflow)
    }

    pub fn build_unchecked(self) -> WorkflowDefinition {
        self.workflow
    }
}
