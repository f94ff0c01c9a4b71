pub mod context;
pub mod blueprint;
pub mod task;
pub mod engine;
pub mod node;
pub mod process;
pub mod syscall;
pub mod storage;
