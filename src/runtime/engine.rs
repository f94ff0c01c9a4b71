use crate::compiler::core::Compiler;
use crate::condition::{ConditionEvaluator, EvalexprConditionEvaluator};
use crate::config::EngineConfig;
use crate::dsl::ProcessDefinition;
use crate::error::EngineError;
use crate::executor::memory::InMemoryExecutorDirectory;
use crate::executor::{Actor, Executor, ExecutorDirectory, ExecutorId};
use crate::nodes::common::{EndDefinition, StartDefinition};
use crate::nodes::multi_task::{MultiTaskDefinition, MultiTaskServices};
use crate::runtime::blueprint::{Blueprint, NodeIndex};
use crate::runtime::context::ExecutionContext;
use crate::runtime::node::{Node, NodeDefinition, NodeState};
use crate::runtime::process::{ExecutionStatus, Process, Token};
use crate::runtime::storage::{InMemoryStateStore, StateStore};
use crate::runtime::syscall::Syscall;
use crate::runtime::task::{DefaultTaskFactory, InMemoryTaskStore, Task, TaskFactory, TaskStore};
use anyhow::Result;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

type PreparedNodes = Arc<Vec<Box<dyn Node>>>;

/// Collaborators the engine and its nodes work with.
#[derive(Clone)]
pub struct EngineServices {
    pub store: Arc<dyn StateStore>,
    pub tasks: Arc<dyn TaskStore>,
    pub directory: Arc<dyn ExecutorDirectory>,
    pub task_factory: Arc<dyn TaskFactory>,
    pub conditions: Arc<dyn ConditionEvaluator>,
    pub config: EngineConfig,
}

impl EngineServices {
    pub fn in_memory() -> Self {
        let tasks: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
        Self {
            store: Arc::new(InMemoryStateStore::new()),
            task_factory: Arc::new(DefaultTaskFactory::new(tasks.clone())),
            tasks,
            directory: Arc::new(InMemoryExecutorDirectory::new()),
            conditions: Arc::new(EvalexprConditionEvaluator),
            config: EngineConfig::default(),
        }
    }

    pub fn with_directory(mut self, directory: Arc<dyn ExecutorDirectory>) -> Self {
        self.directory = directory;
        self
    }

    pub fn with_task_factory(mut self, factory: Arc<dyn TaskFactory>) -> Self {
        self.task_factory = factory;
        self
    }

    pub fn with_conditions(mut self, conditions: Arc<dyn ConditionEvaluator>) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }
}

enum Transition {
    Jump(NodeIndex),
    Wait,
    Terminate,
}

#[derive(Default)]
struct EngineSyscall {
    transition: Option<Transition>,
}

impl Syscall for EngineSyscall {
    fn jump(&mut self, target: NodeIndex) {
        self.transition = Some(Transition::Jump(target));
    }

    fn wait(&mut self) {
        self.transition = Some(Transition::Wait);
    }

    fn terminate(&mut self) {
        self.transition = Some(Transition::Terminate);
    }
}

pub struct Engine {
    services: EngineServices,
    // Registry for Node Factories
    node_registry: HashMap<String, Box<dyn NodeDefinition>>,
    blueprints: DashMap<String, Arc<Blueprint>>,
    // Prepared nodes per definition id
    executable_cache: DashMap<String, PreparedNodes>,
    processes: DashMap<Uuid, Process>,
    tokens: DashMap<Uuid, Token>,
    // One slot per token; the lock serializes every event on that token.
    node_states: DashMap<Uuid, Arc<Mutex<NodeState>>>,
}

impl Engine {
    pub fn new(services: EngineServices) -> Self {
        let multi_task = MultiTaskServices {
            directory: services.directory.clone(),
            tasks: services.tasks.clone(),
            factory: services.task_factory.clone(),
            conditions: services.conditions.clone(),
            temporary_group_prefix: services.config.temporary_group_prefix.clone(),
        };

        let mut engine = Self {
            services,
            node_registry: HashMap::new(),
            blueprints: DashMap::new(),
            executable_cache: DashMap::new(),
            processes: DashMap::new(),
            tokens: DashMap::new(),
            node_states: DashMap::new(),
        };
        engine.register_node(Box::new(StartDefinition));
        engine.register_node(Box::new(EndDefinition));
        engine.register_node(Box::new(MultiTaskDefinition::new(multi_task)));
        engine
    }

    pub fn in_memory() -> Self {
        Self::new(EngineServices::in_memory())
    }

    pub fn register_node(&mut self, definition: Box<dyn NodeDefinition>) {
        self.node_registry.insert(definition.name().to_string(), definition);
    }

    pub fn directory(&self) -> &Arc<dyn ExecutorDirectory> {
        &self.services.directory
    }

    pub fn tasks(&self) -> &Arc<dyn TaskStore> {
        &self.services.tasks
    }

    /// Validates and prepares every node of the blueprint, then makes it startable.
    pub fn deploy(&self, blueprint: Blueprint) -> Result<()> {
        let mut nodes = Vec::with_capacity(blueprint.nodes.len());
        for bp_node in &blueprint.nodes {
            let def = self
                .node_registry
                .get(&bp_node.kind)
                .ok_or_else(|| EngineError::NodeDefinitionNotFound(bp_node.kind.clone()))?;
            def.validate(&bp_node.id, &bp_node.params)?;
            nodes.push(def.prepare(&bp_node.id, bp_node.params.clone())?);
        }

        let id = blueprint.id.clone();
        info!(definition = %id, nodes = nodes.len(), "Process definition deployed");
        self.executable_cache.insert(id.clone(), Arc::new(nodes));
        self.blueprints.insert(id, Arc::new(blueprint));
        Ok(())
    }

    /// Compiles and deploys a process definition; returns its id.
    pub fn deploy_definition(&self, definition: ProcessDefinition) -> Result<String> {
        let blueprint = Compiler::new().compile(definition)?;
        let id = blueprint.id.clone();
        self.deploy(blueprint)?;
        Ok(id)
    }

    pub async fn start_process(&self, definition_id: &str, initial_vars: HashMap<String, Value>) -> Result<Uuid> {
        let blueprint = self.blueprint(definition_id)?;

        let mut vars = initial_vars;
        for variable in &blueprint.variables {
            if let Some(default) = &variable.default {
                vars.entry(variable.name.clone()).or_insert_with(|| default.clone());
            }
        }

        let token_id = Uuid::new_v4();
        let process = Process::new(definition_id, token_id);
        let process_id = process.id;
        self.services.store.init_instance(process_id, vars).await?;
        self.tokens.insert(token_id, Token::root(token_id, process_id, blueprint.start_index));
        self.processes.insert(process_id, process);
        info!(%process_id, definition = %definition_id, "Process started");

        self.enter(token_id).await?;
        Ok(process_id)
    }

    /// Completes a task on behalf of `actor`. Returns whether the task's node was satisfied.
    pub async fn complete_task(&self, task_id: Uuid, actor: &Actor) -> Result<bool> {
        let task = self
            .services
            .tasks
            .get(task_id)
            .await?
            .ok_or(EngineError::TaskNotFound(task_id))?;
        // Leftover tasks of an ended process may still be completed; they no longer move the token.
        let process = self.process(task.process_id)?;
        if process.status == ExecutionStatus::Cancelled {
            return Err(EngineError::ProcessNotActive(process.id).into());
        }

        let slot = self.state_slot(task.token_id);
        {
            let mut state = slot.lock().await;

            // A concurrent completion may have consumed the task while we waited.
            if self.services.tasks.get(task_id).await?.is_none() {
                return Err(EngineError::TaskNotFound(task_id).into());
            }
            let token = self.token(task.token_id)?;
            if token.ended || token.node_index != task.node_index {
                self.services.tasks.remove(task_id).await?;
                debug!(%task_id, token_id = %token.id, "Task completed after its node was left");
                return Ok(false);
            }

            let (ctx, nodes) = self.context(&process, &token)?;
            let node = nodes
                .get(token.node_index)
                .ok_or(EngineError::NodeIndexOutOfBounds(token.node_index))?;
            let mut syscall = EngineSyscall::default();
            node.task_completed(&ctx, &mut state, &task, actor, &mut syscall).await?;
            self.services.tasks.remove(task_id).await?;
            debug!(%task_id, actor = %actor.name, "Task completed");

            match syscall.transition {
                Some(Transition::Jump(target)) => {
                    *state = None;
                    self.move_token(token.id, target)?;
                }
                Some(Transition::Terminate) => {
                    *state = None;
                    self.end_token(token.id)?;
                    return Ok(true);
                }
                Some(Transition::Wait) | None => return Ok(false),
            }
        }

        // The completion stands even if the next node fails; the token keeps the failure for `resume_token`.
        if let Err(e) = self.enter(task.token_id).await {
            warn!(%task_id, token_id = %task.token_id, error = %e, "Successor activation failed");
        }
        Ok(true)
    }

    /// Retries the activation that failed on a token.
    pub async fn resume_token(&self, token_id: Uuid) -> Result<()> {
        let token = self.token(token_id)?;
        let process = self.process(token.process_id)?;
        if !process.is_active() {
            return Err(EngineError::ProcessNotActive(process.id).into());
        }

        let slot = self.state_slot(token_id);
        {
            let _state = slot.lock().await;
            let mut token = self
                .tokens
                .get_mut(&token_id)
                .ok_or(EngineError::TokenNotFound(token_id))?;
            if token.ended || token.failure.take().is_none() {
                return Err(EngineError::NothingToResume(token_id).into());
            }
        }

        info!(process_id = %process.id, %token_id, "Resuming token");
        self.enter(token_id).await
    }

    /// Cancels a running process, releasing what its nodes hold and dropping its open tasks.
    pub async fn cancel_process(&self, process_id: Uuid) -> Result<()> {
        let process = self.process(process_id)?;
        if !process.is_active() {
            return Err(EngineError::ProcessNotActive(process_id).into());
        }

        let tokens: Vec<Token> = self
            .tokens
            .iter()
            .filter(|t| t.process_id == process_id && !t.ended)
            .map(|t| t.value().clone())
            .collect();
        for token in tokens {
            let slot = self.state_slot(token.id);
            let mut state = slot.lock().await;
            let (ctx, nodes) = self.context(&process, &token)?;
            if let Some(node) = nodes.get(token.node_index) {
                if let Err(e) = node.cancel(&ctx, &mut state).await {
                    warn!(%process_id, token_id = %token.id, error = %e, "Node cancellation failed");
                }
            }
            *state = None;
            if let Some(mut t) = self.tokens.get_mut(&token.id) {
                t.ended = true;
            }
        }

        for task in self.services.tasks.find_by_process(process_id).await? {
            self.services.tasks.remove(task.id).await?;
        }
        if let Some(mut p) = self.processes.get_mut(&process_id) {
            p.status = ExecutionStatus::Cancelled;
        }
        info!(%process_id, "Process cancelled");
        Ok(())
    }

    pub fn process(&self, process_id: Uuid) -> Result<Process> {
        self.processes
            .get(&process_id)
            .map(|p| p.value().clone())
            .ok_or_else(|| EngineError::ProcessNotFound(process_id).into())
    }

    pub fn token(&self, token_id: Uuid) -> Result<Token> {
        self.tokens
            .get(&token_id)
            .map(|t| t.value().clone())
            .ok_or_else(|| EngineError::TokenNotFound(token_id).into())
    }

    pub async fn open_tasks(&self, process_id: Uuid) -> Result<Vec<Task>> {
        self.services.tasks.find_by_process(process_id).await
    }

    /// Open tasks `actor` may complete: assigned directly or through a group it belongs to.
    pub async fn assigned_tasks(&self, process_id: Uuid, actor: &Actor) -> Result<Vec<Task>> {
        let mut assigned = Vec::new();
        for task in self.open_tasks(process_id).await? {
            let allowed = match &task.executor {
                Executor::Actor(a) => a.id == actor.id,
                Executor::Group(g) => self.is_member(g.id, actor).await?,
                Executor::TemporaryGroup(g) => self.is_member(g.id, actor).await?,
            };
            if allowed {
                assigned.push(task);
            }
        }
        Ok(assigned)
    }

    pub async fn get_var(&self, process_id: Uuid, name: &str) -> Result<Option<Value>> {
        self.services.store.get_var(process_id, name).await
    }

    /// Pending node state of a token, if any.
    pub async fn token_state(&self, token_id: Uuid) -> Option<Value> {
        let slot = self.node_states.get(&token_id).map(|s| s.value().clone())?;
        let state = slot.lock().await;
        state.clone()
    }

    async fn is_member(&self, group: ExecutorId, actor: &Actor) -> Result<bool> {
        let members = self.services.directory.group_members(group).await?;
        Ok(members.iter().any(|m| m.id == actor.id))
    }

    /// Runs the token from its current node until it waits or ends.
    /// When a node fails, the token stays on it with the failure recorded.
    async fn enter(&self, token_id: Uuid) -> Result<()> {
        loop {
            let token = self.token(token_id)?;
            let process = self.process(token.process_id)?;
            let (ctx, nodes) = self.context(&process, &token)?;
            let node = nodes
                .get(token.node_index)
                .ok_or(EngineError::NodeIndexOutOfBounds(token.node_index))?;

            let slot = self.state_slot(token_id);
            let mut state = slot.lock().await;
            let mut syscall = EngineSyscall::default();
            if let Err(e) = node.execute(&ctx, &mut state, &mut syscall).await {
                error!(process_id = %process.id, %token_id, node = %ctx.node_id(), error = %e, "Node execution failed");
                if let Some(mut t) = self.tokens.get_mut(&token_id) {
                    t.failure = Some(e.to_string());
                }
                return Err(e);
            }

            match syscall.transition {
                Some(Transition::Jump(target)) => {
                    *state = None;
                    self.move_token(token_id, target)?;
                }
                Some(Transition::Terminate) => {
                    *state = None;
                    return self.end_token(token_id);
                }
                Some(Transition::Wait) | None => return Ok(()),
            }
        }
    }

    fn context(&self, process: &Process, token: &Token) -> Result<(ExecutionContext, PreparedNodes)> {
        let definition = self.blueprint(&process.definition_id)?;
        let nodes = self
            .executable_cache
            .get(&process.definition_id)
            .map(|n| n.value().clone())
            .ok_or_else(|| EngineError::DefinitionNotFound(process.definition_id.clone()))?;
        let ctx = ExecutionContext::new(
            process.id,
            process.root_process_id(),
            token.id,
            token.node_index,
            definition,
            self.services.store.clone(),
        );
        Ok((ctx, nodes))
    }

    fn blueprint(&self, definition_id: &str) -> Result<Arc<Blueprint>> {
        self.blueprints
            .get(definition_id)
            .map(|b| b.value().clone())
            .ok_or_else(|| EngineError::DefinitionNotFound(definition_id.to_string()).into())
    }

    fn state_slot(&self, token_id: Uuid) -> Arc<Mutex<NodeState>> {
        self.node_states.entry(token_id).or_default().value().clone()
    }

    fn move_token(&self, token_id: Uuid, target: NodeIndex) -> Result<()> {
        let mut token = self
            .tokens
            .get_mut(&token_id)
            .ok_or(EngineError::TokenNotFound(token_id))?;
        token.node_index = target;
        Ok(())
    }

    fn end_token(&self, token_id: Uuid) -> Result<()> {
        let (process_id, is_root) = {
            let mut token = self
                .tokens
                .get_mut(&token_id)
                .ok_or(EngineError::TokenNotFound(token_id))?;
            token.ended = true;
            (token.process_id, token.parent.is_none())
        };
        if is_root {
            if let Some(mut process) = self.processes.get_mut(&process_id) {
                process.status = ExecutionStatus::Ended;
            }
            info!(%process_id, "Process ended");
        }
        Ok(())
    }
}
