use async_trait::async_trait;
use serde_json::Value;
use crate::executor::Actor;
use crate::runtime::context::ExecutionContext;
use crate::runtime::syscall::Syscall;
use crate::runtime::task::Task;
use anyhow::Result;
use std::fmt::Debug;

/// Per-token state a node keeps between events. `None` when the node is idle.
pub type NodeState = Option<Value>;

/// Runtime node interface.
///
/// The engine owns the state slot of every token and hands it to the node on
/// each event; a node never keeps token state in its own fields.
#[async_trait]
pub trait Node: Send + Sync + Debug {
    /// Called when a token enters the node.
    async fn execute(&self, ctx: &ExecutionContext, state: &mut NodeState, syscall: &mut dyn Syscall) -> Result<()>;

    /// Called when a task created by this node is completed.
    async fn task_completed(
        &self,
        _ctx: &ExecutionContext,
        _state: &mut NodeState,
        _task: &Task,
        _actor: &Actor,
        _syscall: &mut dyn Syscall,
    ) -> Result<()> {
        Ok(())
    }

    /// Called when the owning token is cancelled while sitting on this node.
    async fn cancel(&self, _ctx: &ExecutionContext, _state: &mut NodeState) -> Result<()> {
        Ok(())
    }
}

/// Node factory / definition interface.
pub trait NodeDefinition: Send + Sync {
    fn name(&self) -> &str;
    fn validate(&self, node_id: &str, params: &Value) -> Result<()>;
    fn prepare(&self, node_id: &str, params: Value) -> Result<Box<dyn Node>>;
}
