#![allow(dead_code)]

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use taskflow::dsl::builder::ProcessBuilder;
use taskflow::dsl::{CreationMode, ProcessDefinition, SynchronizationMode};
use taskflow::executor::memory::InMemoryExecutorDirectory;
use taskflow::executor::{Actor, Executor, ExecutorDirectory, ExecutorId, TemporaryGroup};
use taskflow::runtime::context::ExecutionContext;
use taskflow::runtime::engine::{Engine, EngineServices};
use taskflow::runtime::storage::{InMemoryStateStore, StateStore};
use taskflow::runtime::task::{DefaultTaskFactory, Swimlane, Task, TaskDefinition, TaskFactory, TaskStore};
use taskflow::variables::{Usage, VariableScope};
use uuid::Uuid;

/// In-memory directory that counts group deletions and can be told to fail them.
pub struct RecordingDirectory {
    pub inner: InMemoryExecutorDirectory,
    deletes: AtomicUsize,
    fail_deletes: AtomicBool,
}

impl RecordingDirectory {
    pub fn new() -> Self {
        Self {
            inner: InMemoryExecutorDirectory::new(),
            deletes: AtomicUsize::new(0),
            fail_deletes: AtomicBool::new(false),
        }
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn fail_deletes(&self) {
        self.fail_deletes.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ExecutorDirectory for RecordingDirectory {
    async fn resolve_actor(&self, identity: &Value) -> Result<Option<Actor>> {
        self.inner.resolve_actor(identity).await
    }

    async fn resolve_executor(&self, identity: &Value) -> Result<Option<Executor>> {
        self.inner.resolve_executor(identity).await
    }

    async fn group_members(&self, group: ExecutorId) -> Result<Vec<Actor>> {
        self.inner.group_members(group).await
    }

    async fn create_temporary_group(&self, scope_key: &str) -> Result<TemporaryGroup> {
        self.inner.create_temporary_group(scope_key).await
    }

    async fn add_member(&self, group: &TemporaryGroup, actor: &Actor) -> Result<()> {
        self.inner.add_member(group, actor).await
    }

    async fn remove_member(&self, group: &TemporaryGroup, actor: &Actor) -> Result<()> {
        self.inner.remove_member(group, actor).await
    }

    async fn delete_group(&self, group: &TemporaryGroup) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(anyhow!("directory unavailable"));
        }
        self.inner.delete_group(group).await
    }
}

/// Delegates to the default factory and fails on the `fail_at`-th call (1-based).
pub struct FailingFactory {
    inner: DefaultTaskFactory,
    fail_at: usize,
    calls: AtomicUsize,
    created: Mutex<Vec<Uuid>>,
}

impl FailingFactory {
    pub fn new(tasks: Arc<dyn TaskStore>, fail_at: usize) -> Self {
        Self {
            inner: DefaultTaskFactory::new(tasks),
            fail_at,
            calls: AtomicUsize::new(0),
            created: Mutex::new(Vec::new()),
        }
    }

    pub fn created(&self) -> Vec<Uuid> {
        self.created.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl TaskFactory for FailingFactory {
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
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_at {
            return Err(anyhow!("task store rejected task #{}", call));
        }
        let task = self
            .inner
            .create(ctx, scope, definition, swimlane, executor, index, is_async)
            .await?;
        self.created.lock().expect("lock poisoned").push(task.id);
        Ok(task)
    }
}

/// State store that counts writes per variable.
pub struct CountingStore {
    inner: InMemoryStateStore,
    writes: Mutex<HashMap<String, usize>>,
}

impl CountingStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryStateStore::new(),
            writes: Mutex::new(HashMap::new()),
        }
    }

    pub fn writes(&self, key: &str) -> usize {
        self.writes.lock().expect("lock poisoned").get(key).copied().unwrap_or(0)
    }
}

#[async_trait]
impl StateStore for CountingStore {
    async fn get_var(&self, process_id: Uuid, key: &str) -> Result<Option<Value>> {
        self.inner.get_var(process_id, key).await
    }

    async fn set_var(&self, process_id: Uuid, key: &str, value: Value) -> Result<()> {
        *self.writes.lock().expect("lock poisoned").entry(key.to_string()).or_default() += 1;
        self.inner.set_var(process_id, key, value).await
    }

    async fn init_instance(&self, process_id: Uuid, initial_vars: HashMap<String, Value>) -> Result<()> {
        self.inner.init_instance(process_id, initial_vars).await
    }

    async fn get_all_vars(&self, process_id: Uuid) -> Result<HashMap<String, Value>> {
        self.inner.get_all_vars(process_id).await
    }
}

pub struct Fixture {
    pub engine: Arc<Engine>,
    pub directory: Arc<RecordingDirectory>,
    pub alice: Actor,
    pub bob: Actor,
    pub carol: Actor,
    pub dave: Actor,
}

impl Fixture {
    pub fn actor(&self, name: &str) -> Actor {
        self.directory.inner.actor(name).expect("unknown actor")
    }

    pub async fn open_tasks(&self, process_id: Uuid) -> Vec<Task> {
        self.engine.open_tasks(process_id).await.expect("Failed to list tasks")
    }

    /// The single open task assigned to `actor`.
    pub async fn task_of(&self, process_id: Uuid, actor: &Actor) -> Task {
        let tasks = self
            .engine
            .assigned_tasks(process_id, actor)
            .await
            .expect("Failed to list assigned tasks");
        assert_eq!(tasks.len(), 1, "expected exactly one task for {}", actor.name);
        tasks.into_iter().next().expect("task")
    }
}

pub fn fixture() -> Fixture {
    fixture_with(|services| services)
}

/// Actors alice, bob, carol and dave; group "board" holds alice, bob and carol.
pub fn fixture_with(customize: impl FnOnce(EngineServices) -> EngineServices) -> Fixture {
    let directory = Arc::new(RecordingDirectory::new());
    let alice = directory.inner.add_actor("alice");
    let bob = directory.inner.add_actor("bob");
    let carol = directory.inner.add_actor("carol");
    let dave = directory.inner.add_actor("dave");
    directory.inner.add_group("board", &[&alice, &bob, &carol]);

    let services = customize(EngineServices::in_memory().with_directory(directory.clone()));
    Fixture {
        engine: Arc::new(Engine::new(services)),
        directory,
        alice,
        bob,
        carol,
        dave,
    }
}

/// start -> review (one task per reviewer) -> end
pub fn review_process(id: &str, mode: SynchronizationMode) -> ProcessDefinition {
    ProcessBuilder::new(id)
        .start("start")
        .multi_task("review", "Review")
            .creation_mode(CreationMode::ByExecutors)
            .synchronization(mode)
            .discriminator("reviewers", &[Usage::Read])
            .build()
        .end("end")
        .connect("start", "review")
        .connect("review", "end")
        .build()
}

pub fn vars(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}
