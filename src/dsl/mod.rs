pub mod builder;

use crate::runtime::blueprint::SwimlaneDefinition;
use crate::runtime::task::TaskDefinition;
use crate::variables::{Usage, VariableDefinition, VariableMapping};
use serde::{Serialize, Deserialize};

/// Process definition as written in YAML.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub variables: Vec<VariableDefinition>,
    #[serde(default)]
    pub swimlanes: Vec<SwimlaneDefinition>,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum NodeType {
    Start,
    End,
    MultiTask(MultiTaskSpec),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: String,
    #[serde(flatten)]
    pub kind: NodeType,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    pub source: String,
    pub target: String,
}

/// How the instance set is derived from the discriminator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreationMode {
    ByExecutors,
    ByDiscriminatorValue,
}

/// When task completions let the token continue past the node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SynchronizationMode {
    /// Any one completion.
    First,
    /// All spawned tasks completed.
    Last,
    /// One task at a time until every pool member completed one.
    Consecutive,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DiscriminatorSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable: Option<String>,
    #[serde(default)]
    pub usage: Vec<Usage>,
    /// Filter over `item` and `index`; indices evaluating to false get no task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// Configuration of a multi-instance task node.
/// Modes are optional here so that missing ones surface as deployment errors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MultiTaskSpec {
    pub task: TaskDefinition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_mode: Option<CreationMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synchronization_mode: Option<SynchronizationMode>,
    #[serde(default)]
    pub discriminator: DiscriminatorSpec,
    #[serde(default)]
    pub mappings: Vec<VariableMapping>,
    #[serde(default, rename = "async")]
    pub is_async: bool,
}
