//! Results of execution-control and inspection operations.

use serde::Serialize;
use serde_json::Value;

use crate::dap::events::ObservedEvent;

/// How the thread of an execution command was chosen.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ThreadSelection {
    /// Supplied by the caller.
    Explicit,
    /// Taken from the cached stop event.
    LastStopped,
    /// First thread of a fresh `threads` listing.
    FirstListed,
}

/// A thread id with the rule that produced it.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SelectedThread {
    /// Thread the command targeted.
    pub thread_id: i64,
    /// Rule that chose the thread.
    pub selection: ThreadSelection,
}

/// Execution-control commands.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ExecutionCommand {
    /// Resume until the next stop.
    Continue,
    /// Step over the current line (`next`).
    StepOver,
    /// Step into the next call.
    StepIn,
    /// Run until the current frame returns.
    StepOut,
}

impl ExecutionCommand {
    /// Protocol command name.
    #[must_use]
    pub fn protocol_command(self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::StepOver => "next",
            Self::StepIn => "stepIn",
            Self::StepOut => "stepOut",
        }
    }
}

/// Outcome of a resume or step command.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// Command issued.
    pub command: ExecutionCommand,
    /// Thread used and how it was chosen.
    #[serde(flatten)]
    pub thread: SelectedThread,
    /// Adapter response body.
    pub body: Value,
}

/// Variables of the top frame's local scope.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalsReport {
    /// Thread inspected.
    #[serde(flatten)]
    pub thread: SelectedThread,
    /// Frame inspected.
    pub frame_id: i64,
    /// Frame name, usually the function.
    pub frame_name: String,
    /// Scope the variables came from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope_name: Option<String>,
    /// Variables as reported by the adapter.
    pub variables: Vec<Value>,
}

/// Outcome of waiting for a named event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventWaitResult {
    /// Event name waited for.
    pub name: String,
    /// Whether the bound elapsed first.
    pub timed_out: bool,
    /// Bound that applied, in seconds.
    pub timeout_seconds: f64,
    /// Event received, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<ObservedEvent>,
    /// Transport loss reason, if the session disconnected while waiting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disconnected: Option<String>,
}
