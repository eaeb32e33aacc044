#![forbid(unsafe_code)]

pub mod config;
pub mod dap;
pub mod errors;
pub mod mcp;
pub mod models;
pub mod orchestrator;
pub mod paths;
pub mod test_runner;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
