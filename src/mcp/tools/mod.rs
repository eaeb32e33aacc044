//! MCP tool handlers.

pub mod breakpoints;
pub mod execution;
pub mod files;
pub mod inspection;
pub mod launch;
pub mod shutdown;
pub mod test_runs;
pub mod util;
