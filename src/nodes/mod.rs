pub mod common;
pub mod multi_task;
