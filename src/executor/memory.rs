use crate::executor::{Actor, Executor, ExecutorDirectory, ExecutorId, Group, TemporaryGroup};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct InMemoryExecutorDirectory {
    next_id: AtomicU64,
    executors: DashMap<ExecutorId, Executor>,
    // Map<GroupId, Set<ActorId>>
    memberships: DashMap<ExecutorId, BTreeSet<ExecutorId>>,
}

impl InMemoryExecutorDirectory {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            executors: DashMap::new(),
            memberships: DashMap::new(),
        }
    }

    fn allocate_id(&self) -> ExecutorId {
        ExecutorId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    pub fn add_actor(&self, name: &str) -> Actor {
        let actor = Actor { id: self.allocate_id(), name: name.to_string() };
        self.executors.insert(actor.id, Executor::Actor(actor.clone()));
        actor
    }

    pub fn add_group(&self, name: &str, members: &[&Actor]) -> Group {
        let group = Group { id: self.allocate_id(), name: name.to_string() };
        self.executors.insert(group.id, Executor::Group(group.clone()));
        self.memberships.insert(group.id, members.iter().map(|a| a.id).collect());
        group
    }

    pub fn actor(&self, name: &str) -> Option<Actor> {
        self.executors.iter().find_map(|e| match e.value() {
            Executor::Actor(a) if a.name == name => Some(a.clone()),
            _ => None,
        })
    }

    /// Temporary groups that have not been deleted yet.
    pub fn temporary_groups(&self) -> Vec<TemporaryGroup> {
        self.executors
            .iter()
            .filter_map(|e| match e.value() {
                Executor::TemporaryGroup(g) => Some(g.clone()),
                _ => None,
            })
            .collect()
    }

    fn lookup(&self, identity: &Value) -> Option<Executor> {
        match identity {
            Value::String(name) => self.by_name(name),
            Value::Number(n) => n.as_u64().and_then(|id| self.by_id(ExecutorId(id))),
            Value::Object(obj) => {
                if let Some(id) = obj.get("id").and_then(|v| v.as_u64()) {
                    self.by_id(ExecutorId(id))
                } else {
                    obj.get("name").and_then(|v| v.as_str()).and_then(|n| self.by_name(n))
                }
            }
            _ => None,
        }
    }

    fn by_id(&self, id: ExecutorId) -> Option<Executor> {
        self.executors.get(&id).map(|e| e.value().clone())
    }

    fn by_name(&self, name: &str) -> Option<Executor> {
        // Actors win over groups sharing the same name.
        let mut found: Option<Executor> = None;
        for entry in self.executors.iter() {
            if entry.value().name() != name {
                continue;
            }
            match entry.value() {
                Executor::Actor(_) => return Some(entry.value().clone()),
                other => {
                    if found.is_none() {
                        found = Some(other.clone());
                    }
                }
            }
        }
        found
    }
}

impl Default for InMemoryExecutorDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutorDirectory for InMemoryExecutorDirectory {
    async fn resolve_actor(&self, identity: &Value) -> Result<Option<Actor>> {
        Ok(match self.lookup(identity) {
            Some(Executor::Actor(a)) => Some(a),
            _ => None,
        })
    }

    async fn resolve_executor(&self, identity: &Value) -> Result<Option<Executor>> {
        Ok(self.lookup(identity))
    }

    async fn group_members(&self, group: ExecutorId) -> Result<Vec<Actor>> {
        let ids: Vec<ExecutorId> = self
            .memberships
            .get(&group)
            .map(|m| m.iter().copied().collect())
            .ok_or_else(|| anyhow!("Group not found: {}", group))?;

        Ok(ids
            .into_iter()
            .filter_map(|id| match self.by_id(id) {
                Some(Executor::Actor(a)) => Some(a),
                _ => None,
            })
            .collect())
    }

    async fn create_temporary_group(&self, scope_key: &str) -> Result<TemporaryGroup> {
        let group = TemporaryGroup { id: self.allocate_id(), name: scope_key.to_string() };
        self.executors.insert(group.id, Executor::TemporaryGroup(group.clone()));
        self.memberships.insert(group.id, BTreeSet::new());
        Ok(group)
    }

    async fn add_member(&self, group: &TemporaryGroup, actor: &Actor) -> Result<()> {
        let mut members = self
            .memberships
            .get_mut(&group.id)
            .ok_or_else(|| anyhow!("Group not found: {}", group.name))?;
        members.insert(actor.id);
        Ok(())
    }

    async fn remove_member(&self, group: &TemporaryGroup, actor: &Actor) -> Result<()> {
        let mut members = self
            .memberships
            .get_mut(&group.id)
            .ok_or_else(|| anyhow!("Group not found: {}", group.name))?;
        members.remove(&actor.id);
        Ok(())
    }

    async fn delete_group(&self, group: &TemporaryGroup) -> Result<()> {
        self.memberships.remove(&group.id);
        self.executors
            .remove(&group.id)
            .map(|_| ())
            .ok_or_else(|| anyhow!("Group not found: {}", group.name))
    }
}
