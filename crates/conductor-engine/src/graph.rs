//! In-memory execution DAG built from a workflow definition.

use std::collections::{HashMap, HashSet, VecDeque};

use conductor_workflow::{Node, WorkflowDefinition};

use crate::error::EngineError;

/// Dependency-ordered view of a workflow definition.
///
/// Nodes are keyed by id; adjacency is recorded both ways so the scheduler
/// can compute frontiers cheaply. Immutable after construction.
#[derive(Debug)]
pub struct ExecutionGraph {
    nodes: HashMap<String, Node>,
    /// Node ids in definition order, for deterministic frontier iteration.
    order: Vec<String>,
    dependencies: HashMap<String, HashSet<String>>,
    dependents: HashMap<String, HashSet<String>>,
}

impl ExecutionGraph {
    /// Build the graph, rejecting duplicate ids, dangling edges, self-loops
    /// and cycles.
    pub fn build(definition: &WorkflowDefinition) -> Result<Self, EngineError> {
        let mut nodes: HashMap<String, Node> = HashMap::with_capacity(definition.nodes.len());
        let mut order = Vec::with_capacity(definition.nodes.len());

        for node in &definition.nodes {
            if nodes.insert(node.id.clone(), node.clone()).is_some() {
                return Err(EngineError::InvalidGraph(format!(
                    "duplicate node id '{}'",
                    node.id
                )));
            }
            order.push(node.id.clone());
        }

        let mut dependencies: HashMap<String, HashSet<String>> =
            order.iter().map(|id| (id.clone(), HashSet::new())).collect();
        let mut dependents: HashMap<String, HashSet<String>> =
            order.iter().map(|id| (id.clone(), HashSet::new())).collect();

        for conn in &definition.connections {
            if !nodes.contains_key(&conn.source) {
                return Err(EngineError::InvalidGraph(format!(
                    "connection references missing node '{}'",
                    conn.source
                )));
            }
            if !nodes.contains_key(&conn.target) {
                return Err(EngineError::InvalidGraph(format!(
                    "connection references missing node '{}'",
                    conn.target
                )));
            }
            if conn.source == conn.target {
                return Err(EngineError::InvalidGraph(format!(
                    "self-loop on node '{}'",
                    conn.source
                )));
            }
            dependencies
                .get_mut(&conn.target)
                .unwrap()
                .insert(conn.source.clone());
            dependents
                .get_mut(&conn.source)
                .unwrap()
                .insert(conn.target.clone());
        }

        let graph = Self {
            nodes,
            order,
            dependencies,
            dependents,
        };
        graph.check_acyclic()?;
        Ok(graph)
    }

    /// Kahn's algorithm; any unvisited node means a cycle.
    fn check_acyclic(&self) -> Result<(), EngineError> {
        let mut in_degree: HashMap<&str, usize> = self
            .order
            .iter()
            .map(|id| (id.as_str(), self.dependencies[id].len()))
            .collect();

        let mut queue: VecDeque<&str> = self
            .order
            .iter()
            .map(String::as_str)
            .filter(|id| in_degree[id] == 0)
            .collect();

        let mut visited = 0usize;
        while let Some(id) = queue.pop_front() {
            visited += 1;
            for dependent in &self.dependents[id] {
                let degree = in_degree.get_mut(dependent.as_str()).unwrap();
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(dependent.as_str());
                }
            }
        }

        if visited != self.order.len() {
            return Err(EngineError::InvalidGraph(
                "workflow contains a cycle".to_string(),
            ));
        }
        Ok(())
    }

    /// Node ids with no dependencies; the initial frontier.
    pub fn roots(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|id| self.dependencies[*id].is_empty())
            .cloned()
            .collect()
    }

    /// Node ids whose dependency set is satisfied by `executed` and which
    /// have not themselves been consumed. Disabled nodes count as consumed
    /// once the scheduler marks them executed.
    pub fn next(&self, executed: &HashSet<String>) -> Vec<String> {
        self.order
            .iter()
            .filter(|id| !executed.contains(*id))
            .filter(|id| self.dependencies[*id].iter().all(|dep| executed.contains(dep)))
            .cloned()
            .collect()
    }

    /// Get a node blueprint by id.
    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Direct dependencies of a node.
    pub fn dependencies(&self, id: &str) -> Option<&HashSet<String>> {
        self.dependencies.get(id)
    }

    /// Direct dependents of a node.
    pub fn dependents(&self, id: &str) -> Option<&HashSet<String>> {
        self.dependents.get(id)
    }

    /// All node ids in definition order.
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
