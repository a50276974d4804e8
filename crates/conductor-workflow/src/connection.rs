//! Connections between workflow nodes.

use serde::{Deserialize, Serialize};

/// Default connection kind.
pub const CONNECTION_MAIN: &str = "main";

/// A directed edge between two nodes in a workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    /// Source node id.
    pub source: String,
    /// Target node id.
    pub target: String,
    /// Named output on the source node.
    #[serde(default = "main_port")]
    pub source_output: String,
    /// Named input on the target node.
    #[serde(default = "main_port")]
    pub target_input: String,
    /// Connection kind.
    #[serde(default = "main_port", rename = "type")]
    pub kind: String,
}

fn main_port() -> String {
    CONNECTION_MAIN.to_string()
}

impl Connection {
    /// Create a `main → main` connection between two nodes.
    pub fn main(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            source_output: main_port(),
            target_input: main_port(),
            kind: main_port(),
        }
    }

    pub fn with_ports(
        mut self,
        source_output: impl Into<String>,
        target_input: impl Into<String>,
    ) -> Self {
        self.source_output = source_output.into();
        self.target_input = target_input.into();
        self
    }
}
