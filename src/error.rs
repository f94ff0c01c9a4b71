use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the multi-instance task node.
#[derive(Debug, Error)]
pub enum MultiTaskError {
    #[error("Configuration error in node '{node}': {message}")]
    Config { node: String, message: String },
    #[error("Node '{node}' is already active on token {token_id}")]
    AlreadyActive { node: String, token_id: Uuid },
    #[error("Node '{node}' has no pending state on token {token_id}")]
    NotActive { node: String, token_id: Uuid },
    #[error("Variable not found: {0}")]
    VariableNotFound(String),
    #[error("Variable '{0}' does not hold a list")]
    NotAList(String),
    #[error("Condition '{expression}' failed: {message}")]
    Condition { expression: String, message: String },
    #[error("Swimlane '{0}' is not initialized")]
    SwimlaneNotInitialized(String),
    #[error("Node '{0}' has no swimlane")]
    SwimlaneNotDefined(String),
    #[error("Actor '{actor}' is not a member of pool '{pool}'")]
    ExecutorNotInPool { actor: String, pool: String },
}

/// Errors raised by the graph engine hosting the nodes.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Process definition not found: {0}")]
    DefinitionNotFound(String),
    #[error("Node definition not found: {0}")]
    NodeDefinitionNotFound(String),
    #[error("Process not found: {0}")]
    ProcessNotFound(Uuid),
    #[error("Process {0} is not active")]
    ProcessNotActive(Uuid),
    #[error("Token not found: {0}")]
    TokenNotFound(Uuid),
    #[error("Token {0} has no failed activation to resume")]
    NothingToResume(Uuid),
    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),
    #[error("Node index {0} out of bounds")]
    NodeIndexOutOfBounds(usize),
}
