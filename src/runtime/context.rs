use std::sync::Arc;
use serde_json::Value;
use uuid::Uuid;
use crate::runtime::blueprint::{Blueprint, NodeIndex};
use crate::runtime::storage::StateStore;
use crate::variables::MapScope;
use anyhow::Result;

/// Execution context of one token at one node.
/// Cheap to clone (ids and Arcs); variables live in the StateStore.
#[derive(Clone)]
pub struct ExecutionContext {
    pub process_id: Uuid,
    pub root_process_id: Uuid,
    pub token_id: Uuid,
    pub node_index: NodeIndex,
    pub definition: Arc<Blueprint>,
    pub store: Arc<dyn StateStore>,
}

impl ExecutionContext {
    pub fn new(
        process_id: Uuid,
        root_process_id: Uuid,
        token_id: Uuid,
        node_index: NodeIndex,
        definition: Arc<Blueprint>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            process_id,
            root_process_id,
            token_id,
            node_index,
            definition,
            store,
        }
    }

    pub fn node_id(&self) -> &str {
        self.definition
            .nodes
            .get(self.node_index)
            .map(|n| n.id.as_str())
            .unwrap_or("?")
    }

    pub async fn get_var(&self, key: &str) -> Result<Option<Value>> {
        self.store.get_var(self.process_id, key).await
    }

    pub async fn set_var(&self, key: &str, value: Value) -> Result<()> {
        self.store.set_var(self.process_id, key, value).await
    }

    /// Snapshot of the process variables as a node-level scope.
    pub async fn scope(&self) -> Result<MapScope> {
        Ok(MapScope::new(self.store.get_all_vars(self.process_id).await?))
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("process_id", &self.process_id)
            .field("token_id", &self.token_id)
            .field("node", &self.node_id())
            .finish()
    }
}
