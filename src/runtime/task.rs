use crate::executor::Executor;
use crate::runtime::blueprint::NodeIndex;
use crate::runtime::context::ExecutionContext;
use crate::variables::VariableScope;
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Static description of the task a node creates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskDefinition {
    /// Task name; `${var}` placeholders are filled from the instance scope.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swimlane: Option<String>,
}

impl TaskDefinition {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), swimlane: None }
    }

    pub fn with_swimlane(mut self, swimlane: &str) -> Self {
        self.swimlane = Some(swimlane.to_string());
        self
    }
}

/// A swimlane resolved for one process instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Swimlane {
    pub name: String,
    pub executor: Executor,
}

/// A unit of human work bound to the token that spawned it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: Uuid,
    pub name: String,
    pub process_id: Uuid,
    pub root_process_id: Uuid,
    pub token_id: Uuid,
    pub node_index: NodeIndex,
    pub node_id: String,
    pub executor: Executor,
    /// Sequence number within the node activation.
    pub index: usize,
    /// Asynchronous tasks do not hold the token at the node.
    pub is_async: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swimlane: Option<String>,
    /// Instance-level variables the task was created with.
    #[serde(default)]
    pub variables: HashMap<String, Value>,
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert(&self, task: Task) -> Result<()>;
    async fn get(&self, task_id: Uuid) -> Result<Option<Task>>;
    /// Open tasks bound to a token, ordered by index.
    async fn find_by_token(&self, token_id: Uuid) -> Result<Vec<Task>>;
    async fn find_by_process(&self, process_id: Uuid) -> Result<Vec<Task>>;
    /// Removes a task once it is completed or cancelled.
    async fn remove(&self, task_id: Uuid) -> Result<Option<Task>>;
}

pub struct InMemoryTaskStore {
    tasks: DashMap<Uuid, Task>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self { tasks: DashMap::new() }
    }

    fn collect<F: Fn(&Task) -> bool>(&self, filter: F) -> Vec<Task> {
        let mut found: Vec<Task> = self
            .tasks
            .iter()
            .filter(|t| filter(t.value()))
            .map(|t| t.value().clone())
            .collect();
        found.sort_by_key(|t| t.index);
        found
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(&self, task: Task) -> Result<()> {
        self.tasks.insert(task.id, task);
        Ok(())
    }

    async fn get(&self, task_id: Uuid) -> Result<Option<Task>> {
        Ok(self.tasks.get(&task_id).map(|t| t.value().clone()))
    }

    async fn find_by_token(&self, token_id: Uuid) -> Result<Vec<Task>> {
        Ok(self.collect(|t| t.token_id == token_id))
    }

    async fn find_by_process(&self, process_id: Uuid) -> Result<Vec<Task>> {
        Ok(self.collect(|t| t.process_id == process_id))
    }

    async fn remove(&self, task_id: Uuid) -> Result<Option<Task>> {
        Ok(self.tasks.remove(&task_id).map(|(_, t)| t))
    }
}

/// Creates task records for a node.
#[async_trait]
pub trait TaskFactory: Send + Sync {
    #[allow(clippy::too_many_arguments)]
    async fn create(
        &self,
        ctx: &ExecutionContext,
        scope: &dyn VariableScope,
        definition: &TaskDefinition,
        swimlane: Option<&Swimlane>,
        executor: Executor,
        index: usize,
        is_async: bool,
    ) -> Result<Task>;
}

/// Builds the task record and persists it in a TaskStore.
pub struct DefaultTaskFactory {
    tasks: Arc<dyn TaskStore>,
}

impl DefaultTaskFactory {
    pub fn new(tasks: Arc<dyn TaskStore>) -> Self {
        Self { tasks }
    }
}

#[async_trait]
impl TaskFactory for DefaultTaskFactory {
    async fn create(
        &self,
        ctx: &ExecutionContext,
        scope: &dyn VariableScope,
        definition: &TaskDefinition,
        swimlane: Option<&Swimlane>,
        executor: Executor,
        index: usize,
        is_async: bool,
    ) -> Result<Task> {
        let task = Task {
            id: Uuid::new_v4(),
            name: resolve_placeholders(&definition.name, scope),
            process_id: ctx.process_id,
            root_process_id: ctx.root_process_id,
            token_id: ctx.token_id,
            node_index: ctx.node_index,
            node_id: ctx.node_id().to_string(),
            executor,
            index,
            is_async,
            swimlane: swimlane.map(|s| s.name.clone()),
            variables: scope.own_bindings(),
        };
        self.tasks.insert(task.clone()).await?;
        debug!(task_id = %task.id, executor = %task.executor, index, "Task created");
        Ok(task)
    }
}

/// Replaces `${name}` with the scope value of `name`; unknown names are left as-is.
pub fn resolve_placeholders(template: &str, scope: &dyn VariableScope) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match scope.resolve(name) {
                    Some(Value::String(s)) => out.push_str(&s),
                    Some(v) => out.push_str(&v.to_string()),
                    None => out.push_str(&rest[start..start + 2 + end + 1]),
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
