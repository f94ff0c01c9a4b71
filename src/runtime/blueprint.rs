use crate::variables::VariableDefinition;
use serde::{Serialize, Deserialize};
use serde_json::Value;

pub type NodeIndex = usize;

/// Compiled process definition (serializable intermediate form).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blueprint {
    pub id: String,
    pub name: String,
    pub nodes: Vec<BlueprintNode>,
    pub start_index: NodeIndex,
    #[serde(default)]
    pub variables: Vec<VariableDefinition>,
    #[serde(default)]
    pub swimlanes: Vec<SwimlaneDefinition>,
}

impl Blueprint {
    pub fn variable(&self, name: &str) -> Option<&VariableDefinition> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn swimlane(&self, name: &str) -> Option<&SwimlaneDefinition> {
        self.swimlanes.iter().find(|s| s.name == name)
    }
}

/// Node configuration handed to `NodeDefinition::prepare` when the node is loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueprintNode {
    pub id: String,
    /// Node type name (e.g. "start", "multi_task")
    pub kind: String,
    /// Parameters, including jump targets resolved by the compiler (e.g. "next": 1)
    pub params: Value,
}

/// Named role whose executor is resolved per process instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SwimlaneDefinition {
    pub name: String,
    /// Executor identity used when no process variable initializes the swimlane.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initializer: Option<String>,
}
