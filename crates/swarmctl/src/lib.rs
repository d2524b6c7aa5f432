//! agentctl: the workflow engine and CLI over the swarm crates.

pub mod commands;
pub mod context;
pub mod event_log;
pub mod failure;
pub mod store_ops;

pub use context::AppContext;
pub use failure::Failure;
