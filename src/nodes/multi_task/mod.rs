//! Multi-instance task node.
//!
//! One activation fans a node out into a set of human tasks; completions of
//! those tasks are fed back in and the synchronization mode decides when the
//! token may leave the node. Everything that has to survive between those
//! events lives in [`MultiTaskState`], which the engine stores per token.

mod consecutive;
pub mod instances;

pub use instances::{InstanceDescriptor, InstanceSet};

use crate::condition::ConditionEvaluator;
use crate::dsl::{CreationMode, MultiTaskSpec, SynchronizationMode};
use crate::error::MultiTaskError;
use crate::executor::{Actor, ExecutorDirectory, TemporaryGroup};
use crate::runtime::blueprint::NodeIndex;
use crate::runtime::context::ExecutionContext;
use crate::runtime::node::{Node, NodeDefinition, NodeState};
use crate::runtime::syscall::Syscall;
use crate::runtime::task::{Swimlane, Task, TaskDefinition, TaskFactory, TaskStore};
use crate::variables::{OverlayScope, Usage, VariableMapping, VariableScope};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Collaborators shared by every multi-task node of an engine.
#[derive(Clone)]
pub struct MultiTaskServices {
    pub directory: Arc<dyn ExecutorDirectory>,
    pub tasks: Arc<dyn TaskStore>,
    pub factory: Arc<dyn TaskFactory>,
    pub conditions: Arc<dyn ConditionEvaluator>,
    pub temporary_group_prefix: String,
}

impl std::fmt::Debug for MultiTaskServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiTaskServices")
            .field("conditions", &self.conditions)
            .field("temporary_group_prefix", &self.temporary_group_prefix)
            .finish()
    }
}

/// Pending state of one token on a multi-task node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MultiTaskState {
    pub instances: InstanceSet,
    /// Ordinal of the next consecutive task.
    pub cursor: usize,
    /// Remaining pool of a consecutive run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<TemporaryGroup>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Activation {
    pub created: bool,
    /// `None` when nothing is pending on the token.
    pub state: Option<MultiTaskState>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub satisfied: bool,
    pub state: Option<MultiTaskState>,
}

#[derive(Debug, Deserialize)]
struct MultiTaskParams {
    #[serde(flatten)]
    spec: MultiTaskSpec,
    #[serde(default)]
    next: Option<NodeIndex>,
}

pub struct MultiTaskDefinition {
    services: MultiTaskServices,
}

impl MultiTaskDefinition {
    pub fn new(services: MultiTaskServices) -> Self {
        Self { services }
    }

    fn build(&self, node_id: &str, params: Value) -> Result<MultiTaskNode> {
        let config_error = |message: &str| -> anyhow::Error {
            MultiTaskError::Config { node: node_id.to_string(), message: message.to_string() }.into()
        };

        let params: MultiTaskParams = serde_json::from_value(params)
            .map_err(|e| config_error(&format!("invalid parameters: {}", e)))?;
        let spec = params.spec;

        let creation_mode = spec.creation_mode.ok_or_else(|| config_error("creation mode is not set"))?;
        let synchronization_mode = spec
            .synchronization_mode
            .ok_or_else(|| config_error("synchronization mode is not set"))?;
        let discriminator_variable = spec
            .discriminator
            .variable
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| config_error("discriminator variable is not set"))?;

        if synchronization_mode == SynchronizationMode::Consecutive && spec.is_async {
            return Err(config_error("consecutive synchronization cannot be asynchronous"));
        }
        if let Some(condition) = &spec.discriminator.condition {
            self.services
                .conditions
                .validate(condition)
                .map_err(|e| config_error(&format!("invalid discriminator condition '{}': {}", condition, e)))?;
        }
        if let Some(mapping) = spec.mappings.iter().find(|m| m.name.is_empty() || m.mapped_name.is_empty()) {
            return Err(config_error(&format!("incomplete variable mapping '{}' -> '{}'", mapping.name, mapping.mapped_name)));
        }

        let node = MultiTaskNode {
            node_id: node_id.to_string(),
            task: spec.task,
            creation_mode,
            synchronization_mode,
            discriminator_variable,
            discriminator_usage: spec.discriminator.usage,
            condition: spec.discriminator.condition,
            mappings: spec.mappings,
            is_async: spec.is_async,
            next: params.next,
            services: self.services.clone(),
        };

        if node.links_by_variable() && node.task.swimlane.is_none() {
            return Err(config_error("tasks linked by variable need a swimlane"));
        }
        Ok(node)
    }
}

impl NodeDefinition for MultiTaskDefinition {
    fn name(&self) -> &str { "multi_task" }

    fn validate(&self, node_id: &str, params: &Value) -> Result<()> {
        self.build(node_id, params.clone()).map(|_| ())
    }

    fn prepare(&self, node_id: &str, params: Value) -> Result<Box<dyn Node>> {
        Ok(Box::new(self.build(node_id, params)?))
    }
}

#[derive(Debug)]
pub struct MultiTaskNode {
    node_id: String,
    task: TaskDefinition,
    creation_mode: CreationMode,
    synchronization_mode: SynchronizationMode,
    discriminator_variable: String,
    discriminator_usage: Vec<Usage>,
    condition: Option<String>,
    mappings: Vec<VariableMapping>,
    is_async: bool,
    next: Option<NodeIndex>,
    services: MultiTaskServices,
}

impl MultiTaskNode {
    pub fn synchronization_mode(&self) -> SynchronizationMode {
        self.synchronization_mode
    }

    /// Instances follow list positions instead of executor identities.
    pub fn links_by_variable(&self) -> bool {
        self.creation_mode == CreationMode::ByDiscriminatorValue
            && self.discriminator_usage.contains(&Usage::MultiinstanceLink)
    }

    /// Fans the node out for a token entering it.
    pub async fn activate(&self, ctx: &ExecutionContext, state: Option<MultiTaskState>) -> Result<Activation> {
        if state.is_some() {
            return Err(MultiTaskError::AlreadyActive {
                node: self.node_id.clone(),
                token_id: ctx.token_id,
            }
            .into());
        }

        let scope: Arc<dyn VariableScope> = Arc::new(ctx.scope().await?);
        let instances = self.compute_instances(ctx, &scope).await?;

        let activation = if self.synchronization_mode == SynchronizationMode::Consecutive {
            self.start_consecutive(ctx, scope, instances).await?
        } else {
            self.fan_out(ctx, scope, instances).await?
        };

        if !activation.created {
            debug!(node = %self.node_id, token_id = %ctx.token_id, "No tasks were created");
        }
        Ok(activation)
    }

    /// Feeds a task completion into the synchronization mode.
    pub async fn complete(
        &self,
        ctx: &ExecutionContext,
        state: Option<MultiTaskState>,
        task: &Task,
        actor: &Actor,
    ) -> Result<Completion> {
        match self.synchronization_mode {
            SynchronizationMode::First => Ok(Completion { satisfied: true, state: None }),
            SynchronizationMode::Last => {
                let open = self.services.tasks.find_by_token(task.token_id).await?;
                let last = open
                    .iter()
                    .filter(|t| t.node_index == task.node_index)
                    .all(|t| t.id == task.id);
                Ok(Completion { satisfied: last, state: if last { None } else { state } })
            }
            SynchronizationMode::Consecutive => {
                let state = state.ok_or_else(|| MultiTaskError::NotActive {
                    node: self.node_id.clone(),
                    token_id: ctx.token_id,
                })?;
                self.advance_pool(ctx, state, actor).await
            }
        }
    }

    /// Releases what a pending activation holds when its token is cancelled.
    pub async fn release(&self, ctx: &ExecutionContext, state: Option<MultiTaskState>) {
        if let Some(pool) = state.and_then(|s| s.pool) {
            info!(node = %self.node_id, token_id = %ctx.token_id, group = %pool.name, "Releasing consecutive pool");
            self.release_pool(&pool).await;
        }
    }

    async fn fan_out(
        &self,
        ctx: &ExecutionContext,
        scope: Arc<dyn VariableScope>,
        instances: InstanceSet,
    ) -> Result<Activation> {
        let mut created = Vec::new();
        let outcome = async {
            let swimlane = if instances.by_variable && !instances.is_empty() {
                Some(self.resolve_swimlane(ctx, scope.as_ref()).await?)
            } else {
                None
            };
            self.spawn_instances(ctx, &scope, &instances, swimlane.as_ref(), &mut created).await?;
            // Grows even when every instance was excluded or skipped.
            self.extend_containers(ctx, scope.as_ref(), instances.container_size()).await?;
            Ok::<_, anyhow::Error>(())
        }
        .await;

        if let Err(e) = outcome {
            self.rollback(&created).await;
            return Err(e);
        }

        let pending = !created.is_empty() && !self.is_async;
        Ok(Activation {
            created: !created.is_empty(),
            state: pending.then(|| MultiTaskState { instances, cursor: 0, pool: None }),
        })
    }

    async fn spawn_instances(
        &self,
        ctx: &ExecutionContext,
        scope: &Arc<dyn VariableScope>,
        instances: &InstanceSet,
        swimlane: Option<&Swimlane>,
        created: &mut Vec<Task>,
    ) -> Result<()> {
        let factory = &self.services.factory;
        let mut ordinal = 0;
        for descriptor in &instances.descriptors {
            match descriptor {
                InstanceDescriptor::Executor { identity } => {
                    let Some(executor) = self.services.directory.resolve_executor(identity).await? else {
                        warn!(node = %self.node_id, %identity, "Executor not found, instance skipped");
                        continue;
                    };
                    let instance_scope = OverlayScope::new(scope.clone());
                    let task = factory
                        .create(ctx, &instance_scope, &self.task, None, executor, ordinal, self.is_async)
                        .await?;
                    created.push(task);
                    ordinal += 1;
                }
                InstanceDescriptor::Indexed { index, bindings, .. } => {
                    let swimlane = swimlane
                        .ok_or_else(|| MultiTaskError::SwimlaneNotDefined(self.node_id.clone()))?;
                    let instance_scope = OverlayScope::with_bindings(bindings.clone(), scope.clone());
                    let task = factory
                        .create(
                            ctx,
                            &instance_scope,
                            &self.task,
                            Some(swimlane),
                            swimlane.executor.clone(),
                            *index,
                            self.is_async,
                        )
                        .await?;
                    created.push(task);
                }
            }
        }
        Ok(())
    }

    /// Swimlane executor from the process variable of the same name, or the declared initializer.
    async fn resolve_swimlane(&self, ctx: &ExecutionContext, scope: &dyn VariableScope) -> Result<Swimlane> {
        let name = self
            .task
            .swimlane
            .clone()
            .ok_or_else(|| MultiTaskError::SwimlaneNotDefined(self.node_id.clone()))?;

        let identity = match scope.resolve(&name) {
            Some(value) if !value.is_null() => Some(value),
            _ => ctx
                .definition
                .swimlane(&name)
                .and_then(|s| s.initializer.clone())
                .map(Value::String),
        };
        let Some(identity) = identity else {
            return Err(MultiTaskError::SwimlaneNotInitialized(name).into());
        };

        match self.services.directory.resolve_executor(&identity).await? {
            Some(executor) => Ok(Swimlane { name, executor }),
            None => Err(MultiTaskError::SwimlaneNotInitialized(name).into()),
        }
    }

    /// Pads writable list mappings with nulls up to `size`.
    async fn extend_containers(&self, ctx: &ExecutionContext, scope: &dyn VariableScope, size: usize) -> Result<()> {
        for mapping in self.mappings.iter().filter(|m| m.is_writable()) {
            let declared_list = ctx
                .definition
                .variable(&mapping.name)
                .is_some_and(|d| d.format.is_container());

            let mut items = match scope.resolve(&mapping.name) {
                Some(Value::Array(items)) => items,
                Some(Value::Null) | None if declared_list => Vec::new(),
                _ => continue,
            };
            if items.len() >= size {
                continue;
            }
            items.resize(size, Value::Null);
            ctx.set_var(&mapping.name, Value::Array(items)).await?;
            debug!(node = %self.node_id, variable = %mapping.name, size, "Container variable extended");
        }
        Ok(())
    }

    async fn rollback(&self, created: &[Task]) {
        for task in created {
            if let Err(e) = self.services.tasks.remove(task.id).await {
                warn!(node = %self.node_id, task_id = %task.id, error = %e, "Failed to remove task on rollback");
            }
        }
    }

    async fn release_pool(&self, pool: &TemporaryGroup) {
        if let Err(e) = self.services.directory.delete_group(pool).await {
            warn!(node = %self.node_id, group = %pool.name, error = %e, "Failed to delete temporary group");
        }
    }

    fn leave(&self, syscall: &mut dyn Syscall) {
        match self.next {
            Some(target) => syscall.jump(target),
            None => syscall.terminate(),
        }
    }
}

fn decode_state(state: &NodeState) -> Result<Option<MultiTaskState>> {
    Ok(state.as_ref().map(|v| serde_json::from_value(v.clone())).transpose()?)
}

fn encode_state(state: Option<MultiTaskState>) -> Result<NodeState> {
    Ok(state.map(serde_json::to_value).transpose()?)
}

#[async_trait]
impl Node for MultiTaskNode {
    async fn execute(&self, ctx: &ExecutionContext, state: &mut NodeState, syscall: &mut dyn Syscall) -> Result<()> {
        let activation = self.activate(ctx, decode_state(state)?).await?;
        *state = encode_state(activation.state)?;

        if self.is_async || !activation.created {
            debug!(node = %self.node_id, token_id = %ctx.token_id, "Continuing past node");
            self.leave(syscall);
        } else {
            syscall.wait();
        }
        Ok(())
    }

    async fn task_completed(
        &self,
        ctx: &ExecutionContext,
        state: &mut NodeState,
        task: &Task,
        actor: &Actor,
        syscall: &mut dyn Syscall,
    ) -> Result<()> {
        let completion = self.complete(ctx, decode_state(state)?, task, actor).await?;
        *state = encode_state(completion.state)?;

        if completion.satisfied {
            info!(node = %self.node_id, token_id = %ctx.token_id, task_id = %task.id, "Node satisfied");
            self.leave(syscall);
        } else {
            syscall.wait();
        }
        Ok(())
    }

    async fn cancel(&self, ctx: &ExecutionContext, state: &mut NodeState) -> Result<()> {
        self.release(ctx, decode_state(state)?).await;
        *state = None;
        Ok(())
    }
}
