use crate::runtime::node::{Node, NodeDefinition, NodeState};
use crate::runtime::context::ExecutionContext;
use crate::runtime::syscall::Syscall;
use async_trait::async_trait;
use serde_json::Value;
use anyhow::Result;

#[derive(Debug)]
pub struct StartNode {
    next: Option<usize>,
}

pub struct StartDefinition;

impl NodeDefinition for StartDefinition {
    fn name(&self) -> &str { "start" }
    fn validate(&self, _node_id: &str, _params: &Value) -> Result<()> { Ok(()) }
    fn prepare(&self, _node_id: &str, params: Value) -> Result<Box<dyn Node>> {
        let next = params.get("next").and_then(|v| v.as_u64()).map(|i| i as usize);
        Ok(Box::new(StartNode { next }))
    }
}

#[async_trait]
impl Node for StartNode {
    async fn execute(&self, _ctx: &ExecutionContext, _state: &mut NodeState, syscall: &mut dyn Syscall) -> Result<()> {
        match self.next {
            Some(target) => syscall.jump(target),
            None => syscall.terminate(),
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct EndNode;

pub struct EndDefinition;

impl NodeDefinition for EndDefinition {
    fn name(&self) -> &str { "end" }
    fn validate(&self, _node_id: &str, _params: &Value) -> Result<()> { Ok(()) }
    fn prepare(&self, _node_id: &str, _params: Value) -> Result<Box<dyn Node>> {
        Ok(Box::new(EndNode))
    }
}

#[async_trait]
impl Node for EndNode {
    async fn execute(&self, _ctx: &ExecutionContext, _state: &mut NodeState, syscall: &mut dyn Syscall) -> Result<()> {
        syscall.terminate();
        Ok(())
    }
}
