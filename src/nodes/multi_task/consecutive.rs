use super::{Activation, Completion, InstanceSet, MultiTaskNode, MultiTaskState};
use crate::error::MultiTaskError;
use crate::executor::{Actor, Executor, TemporaryGroup};
use crate::runtime::context::ExecutionContext;
use crate::runtime::task::Task;
use crate::variables::{OverlayScope, VariableScope};
use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

impl MultiTaskNode {
    /// Builds the pool as a temporary group and hands out the first task.
    pub(super) async fn start_consecutive(
        &self,
        ctx: &ExecutionContext,
        scope: Arc<dyn VariableScope>,
        instances: InstanceSet,
    ) -> Result<Activation> {
        let directory = &self.services.directory;
        let scope_key = format!(
            "{}_{}_{}",
            self.services.temporary_group_prefix, ctx.definition.id, ctx.token_id
        );
        let pool = directory.create_temporary_group(&scope_key).await?;

        let size = match self.fill_pool(ctx, scope.as_ref(), &instances, &pool).await {
            Ok(size) => size,
            Err(e) => {
                self.release_pool(&pool).await;
                return Err(e);
            }
        };
        if size == 0 {
            self.release_pool(&pool).await;
            return Ok(Activation { created: false, state: None });
        }

        let mut state = MultiTaskState { instances, cursor: 0, pool: Some(pool.clone()) };
        let task = match self.create_round_task(ctx, &scope, &mut state).await {
            Ok(task) => task,
            Err(e) => {
                self.release_pool(&pool).await;
                return Err(e);
            }
        };
        if let Err(e) = self.extend_containers(ctx, scope.as_ref(), size).await {
            self.rollback(&[task]).await;
            self.release_pool(&pool).await;
            return Err(e);
        }

        info!(node = %self.node_id, token_id = %ctx.token_id, group = %pool.name, size, "Consecutive pool created");
        Ok(Activation { created: true, state: Some(state) })
    }

    /// Adds the candidate actors to the pool and returns its member count.
    async fn fill_pool(
        &self,
        ctx: &ExecutionContext,
        scope: &dyn VariableScope,
        instances: &InstanceSet,
        pool: &TemporaryGroup,
    ) -> Result<usize> {
        let directory = &self.services.directory;

        if instances.by_variable {
            if !instances.is_empty() {
                let swimlane = self.resolve_swimlane(ctx, scope).await?;
                match &swimlane.executor {
                    Executor::Group(group) => {
                        for actor in directory.group_members(group.id).await? {
                            directory.add_member(pool, &actor).await?;
                        }
                    }
                    Executor::Actor(actor) => directory.add_member(pool, actor).await?,
                    Executor::TemporaryGroup(other) => {
                        warn!(node = %self.node_id, swimlane = %swimlane.name, group = %other.name, "Swimlane executor is neither a group nor an actor");
                    }
                }
            }
        } else {
            for identity in instances.identities() {
                match directory.resolve_actor(identity).await? {
                    Some(actor) => directory.add_member(pool, &actor).await?,
                    None => debug!(node = %self.node_id, %identity, "Actor not found for identity"),
                }
            }
        }

        Ok(directory.group_members(pool.id).await?.len())
    }

    /// Creates the task of the next round, stamped with the cursor.
    async fn create_round_task(
        &self,
        ctx: &ExecutionContext,
        scope: &Arc<dyn VariableScope>,
        state: &mut MultiTaskState,
    ) -> Result<Task> {
        let pool = state.pool.clone().ok_or_else(|| MultiTaskError::NotActive {
            node: self.node_id.clone(),
            token_id: ctx.token_id,
        })?;
        let ordinal = state.cursor;

        let mut instance_scope = OverlayScope::new(scope.clone());
        instance_scope.add("index", json!(ordinal));
        let task = self
            .services
            .factory
            .create(ctx, &instance_scope, &self.task, None, Executor::TemporaryGroup(pool), ordinal, self.is_async)
            .await?;

        state.cursor += 1;
        Ok(task)
    }

    /// Removes the completing actor from the pool and either hands out the
    /// next task or, once the pool is empty, deletes it and satisfies the node.
    pub(super) async fn advance_pool(
        &self,
        ctx: &ExecutionContext,
        mut state: MultiTaskState,
        actor: &Actor,
    ) -> Result<Completion> {
        let directory = &self.services.directory;
        let pool = state.pool.clone().ok_or_else(|| MultiTaskError::NotActive {
            node: self.node_id.clone(),
            token_id: ctx.token_id,
        })?;

        let members = directory.group_members(pool.id).await?;
        if !members.iter().any(|m| m.id == actor.id) {
            return Err(MultiTaskError::ExecutorNotInPool {
                actor: actor.name.clone(),
                pool: pool.name.clone(),
            }
            .into());
        }

        directory.remove_member(&pool, actor).await?;
        let remaining = directory.group_members(pool.id).await?.len();
        if remaining == 0 {
            info!(node = %self.node_id, token_id = %ctx.token_id, group = %pool.name, "Consecutive pool exhausted");
            self.release_pool(&pool).await;
            return Ok(Completion { satisfied: true, state: None });
        }

        let next = async {
            let scope: Arc<dyn VariableScope> = Arc::new(ctx.scope().await?);
            self.create_round_task(ctx, &scope, &mut state).await
        }
        .await;

        match next {
            Ok(task) => {
                debug!(node = %self.node_id, task_id = %task.id, index = task.index, remaining, "Next consecutive task created");
                Ok(Completion { satisfied: false, state: Some(state) })
            }
            Err(e) => {
                if let Err(restore) = directory.add_member(&pool, actor).await {
                    warn!(node = %self.node_id, group = %pool.name, error = %restore, "Failed to restore pool member");
                }
                Err(e)
            }
        }
    }
}
