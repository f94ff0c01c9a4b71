use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;
use anyhow::Result;
use dashmap::DashMap;
use std::collections::HashMap;

/// Process variable storage.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get_var(&self, process_id: Uuid, key: &str) -> Result<Option<Value>>;
    async fn set_var(&self, process_id: Uuid, key: &str, value: Value) -> Result<()>;
    async fn init_instance(&self, process_id: Uuid, initial_vars: HashMap<String, Value>) -> Result<()>;
    /// Used for building node scopes and evaluating expressions.
    async fn get_all_vars(&self, process_id: Uuid) -> Result<HashMap<String, Value>>;
}

pub struct InMemoryStateStore {
    // Map<ProcessId, Map<VarKey, Value>>
    vars: DashMap<Uuid, DashMap<String, Value>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self {
            vars: DashMap::new(),
        }
    }
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get_var(&self, process_id: Uuid, key: &str) -> Result<Option<Value>> {
        if let Some(proc_vars) = self.vars.get(&process_id) {
            Ok(proc_vars.get(key).map(|v| v.value().clone()))
        } else {
            Ok(None)
        }
    }

    async fn set_var(&self, process_id: Uuid, key: &str, value: Value) -> Result<()> {
        let proc_vars = self.vars.entry(process_id).or_default();
        proc_vars.insert(key.to_string(), value);
        Ok(())
    }

    async fn init_instance(&self, process_id: Uuid, initial_vars: HashMap<String, Value>) -> Result<()> {
        let proc_vars = DashMap::new();
        for (k, v) in initial_vars {
            proc_vars.insert(k, v);
        }
        self.vars.insert(process_id, proc_vars);
        Ok(())
    }

    async fn get_all_vars(&self, process_id: Uuid) -> Result<HashMap<String, Value>> {
        if let Some(proc_vars) = self.vars.get(&process_id) {
            Ok(proc_vars
                .iter()
                .map(|item| (item.key().clone(), item.value().clone()))
                .collect())
        } else {
            Ok(HashMap::new())
        }
    }
}
