pub mod compiler;
pub mod condition;
pub mod config;
pub mod dsl;
pub mod error;
pub mod executor;
pub mod nodes;
pub mod runtime;
pub mod variables;
