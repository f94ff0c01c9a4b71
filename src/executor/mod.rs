pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExecutorId(pub u64);

impl fmt::Display for ExecutorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub id: ExecutorId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Group {
    pub id: ExecutorId,
    pub name: String,
}

/// Ephemeral group holding the pending pool of one consecutive run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemporaryGroup {
    pub id: ExecutorId,
    pub name: String,
}

/// Anything a task can be assigned to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Executor {
    Actor(Actor),
    Group(Group),
    TemporaryGroup(TemporaryGroup),
}

impl Executor {
    pub fn id(&self) -> ExecutorId {
        match self {
            Executor::Actor(a) => a.id,
            Executor::Group(g) => g.id,
            Executor::TemporaryGroup(g) => g.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Executor::Actor(a) => &a.name,
            Executor::Group(g) => &g.name,
            Executor::TemporaryGroup(g) => &g.name,
        }
    }
}

impl fmt::Display for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Executor::Actor(a) => write!(f, "actor:{}", a.name),
            Executor::Group(g) => write!(f, "group:{}", g.name),
            Executor::TemporaryGroup(g) => write!(f, "tmp:{}", g.name),
        }
    }
}

/// Resolves identities to executors and manages temporary groups.
#[async_trait]
pub trait ExecutorDirectory: Send + Sync {
    async fn resolve_actor(&self, identity: &Value) -> Result<Option<Actor>>;
    async fn resolve_executor(&self, identity: &Value) -> Result<Option<Executor>>;
    /// Members of a persistent or temporary group, ordered by id.
    async fn group_members(&self, group: ExecutorId) -> Result<Vec<Actor>>;
    async fn create_temporary_group(&self, scope_key: &str) -> Result<TemporaryGroup>;
    async fn add_member(&self, group: &TemporaryGroup, actor: &Actor) -> Result<()>;
    async fn remove_member(&self, group: &TemporaryGroup, actor: &Actor) -> Result<()>;
    async fn delete_group(&self, group: &TemporaryGroup) -> Result<()>;
}
