//! Process-wide node type registry.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use conductor_workflow::{NodeCategory, NodeDefinition};

use crate::error::EngineError;
use crate::executor::NodeExecutor;

struct RegistryEntry {
    executor: Arc<dyn NodeExecutor>,
    definition: NodeDefinition,
}

/// Thread-safe directory mapping a node type id to its executor and
/// definition. Read-heavy after startup; occasional post-startup writes are
/// safe.
///
/// One instance is created at startup and injected into the engine; there
/// are no implicit globals. Multi-tenant deployments instantiate one
/// registry per tenant.
#[derive(Default)]
pub struct NodeRegistry {
    entries: DashMap<String, RegistryEntry>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// A registry preloaded with the built-in executors.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register_many(crate::executor::builtin_executors());
        registry
    }

    /// Register an executor under its definition's type id.
    ///
    /// Registering a type that is already present is a no-op with a
    /// warning; existing entries are never silently replaced. Returns
    /// whether the entry was added.
    pub fn register(&self, executor: Arc<dyn NodeExecutor>, definition: NodeDefinition) -> bool {
        let node_type = definition.node_type.clone();
        match self.entries.entry(node_type.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                warn!(node_type = %node_type, "node type already registered, skipping");
                false
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(RegistryEntry {
                    executor,
                    definition,
                });
                debug!(node_type = %node_type, "registered node type");
                true
            }
        }
    }

    /// Register an executor with the definition it reports for itself.
    pub fn register_executor(&self, executor: Arc<dyn NodeExecutor>) -> bool {
        let definition = executor.definition();
        self.register(executor, definition)
    }

    /// Register a batch of executors, e.g. a plugin's exported types.
    ///
    /// The type id comes from each executor's own definition. Per-type
    /// failures (duplicates) are reported and skipped; registration
    /// continues. Returns the number actually registered.
    pub fn register_many<I>(&self, executors: I) -> usize
    where
        I: IntoIterator<Item = Arc<dyn NodeExecutor>>,
    {
        let mut registered = 0;
        for executor in executors {
            if self.register_executor(executor) {
                registered += 1;
            }
        }
        registered
    }

    /// Look up the executor for a node type.
    pub fn get(&self, node_type: &str) -> Result<Arc<dyn NodeExecutor>, EngineError> {
        self.entries
            .get(node_type)
            .map(|entry| Arc::clone(&entry.executor))
            .ok_or_else(|| EngineError::UnknownNodeType(node_type.to_string()))
    }

    /// Look up the definition for a node type.
    pub fn definition(&self, node_type: &str) -> Option<NodeDefinition> {
        self.entries.get(node_type).map(|entry| entry.definition.clone())
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.entries.contains_key(node_type)
    }

    /// All registered definitions.
    pub fn list(&self) -> Vec<NodeDefinition> {
        self.entries
            .iter()
            .map(|entry| entry.definition.clone())
            .collect()
    }

    /// Registered definitions in a category.
    pub fn list_by_category(&self, category: NodeCategory) -> Vec<NodeDefinition> {
        self.entries
            .iter()
            .filter(|entry| entry.definition.category == category)
            .map(|entry| entry.definition.clone())
            .collect()
    }

    /// Remove a node type. Returns whether it was present.
    pub fn unregister(&self, node_type: &str) -> bool {
        self.entries.remove(node_type).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
