//! Serializable domain model shared by the orchestrator and the tool layer.

pub mod breakpoint;
pub mod execution;
pub mod launch;
pub mod session;
pub mod stopped;
