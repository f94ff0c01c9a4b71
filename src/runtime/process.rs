use crate::runtime::blueprint::NodeIndex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Active,
    Ended,
    Cancelled,
}

/// One execution of a deployed process definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Process {
    pub id: Uuid,
    pub definition_id: String,
    pub status: ExecutionStatus,
    pub root_token: Uuid,
    /// Ids from the root process down to this one.
    pub hierarchy: Vec<Uuid>,
}

impl Process {
    pub fn new(definition_id: &str, root_token: Uuid) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            definition_id: definition_id.to_string(),
            status: ExecutionStatus::Active,
            root_token,
            hierarchy: vec![id],
        }
    }

    pub fn root_process_id(&self) -> Uuid {
        self.hierarchy.first().copied().unwrap_or(self.id)
    }

    pub fn is_active(&self) -> bool {
        self.status == ExecutionStatus::Active
    }
}

/// A point of control flow inside a process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub id: Uuid,
    pub process_id: Uuid,
    pub parent: Option<Uuid>,
    pub node_index: NodeIndex,
    pub ended: bool,
    /// Error of the last failed activation; the token waits on that node for a retry.
    #[serde(default)]
    pub failure: Option<String>,
}

impl Token {
    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    pub fn root(id: Uuid, process_id: Uuid, start_index: NodeIndex) -> Self {
        Self {
            id,
            process_id,
            parent: None,
            node_index: start_index,
            ended: false,
            failure: None,
        }
    }
}
