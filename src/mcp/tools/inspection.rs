//! Inspection tool handlers: locals, the cached stop, and event waits.

use std::sync::Arc;

use rmcp::handler::server::tool::ToolCallContext;
use rmcp::model::CallToolResult;
use tracing::{info_span, Instrument};

use crate::mcp::handler::DebugBridgeServer;
use crate::mcp::tools::execution::ThreadInput;
use crate::mcp::tools::util::{parse_input, tool_result};
use crate::models::launch::seconds;

/// Input parameters for `dap_wait_for_event`.
#[derive(Debug, serde::Deserialize)]
struct WaitForEventInput {
    /// Event name (default: `stopped`).
    #[serde(default = "default_event")]
    name: String,
    /// Seconds to wait (default: 5).
    #[serde(default = "default_timeout")]
    timeout: f64,
}

fn default_event() -> String {
    "stopped".to_owned()
}

fn default_timeout() -> f64 {
    5.0
}

/// Handle the `dap_locals` tool call.
///
/// # Errors
///
/// Returns `rmcp::ErrorData` for malformed arguments.
pub async fn handle_locals(
    context: ToolCallContext<'_, DebugBridgeServer>,
) -> Result<CallToolResult, rmcp::ErrorData> {
    let state = Arc::clone(context.service.state());
    let input: ThreadInput = parse_input(context, "dap_locals")?;
    let span = info_span!("dap_locals", thread_id = ?input.thread_id);

    async move { tool_result("dap_locals", state.sessions.locals(input.thread_id).await) }
        .instrument(span)
        .await
}

/// Handle the `dap_last_stopped_event` tool call.
///
/// # Errors
///
/// Returns `rmcp::ErrorData` if the snapshot cannot be serialized.
pub async fn handle_last_stopped_event(
    context: ToolCallContext<'_, DebugBridgeServer>,
) -> Result<CallToolResult, rmcp::ErrorData> {
    let state = Arc::clone(context.service.state());
    tool_result(
        "dap_last_stopped_event",
        state.sessions.last_stopped_event().await,
    )
}

/// Handle the `dap_wait_for_event` tool call.
///
/// # Errors
///
/// Returns `rmcp::ErrorData` for malformed arguments.
pub async fn handle_wait_for_event(
    context: ToolCallContext<'_, DebugBridgeServer>,
) -> Result<CallToolResult, rmcp::ErrorData> {
    let state = Arc::clone(context.service.state());
    let input: WaitForEventInput = parse_input(context, "dap_wait_for_event")?;
    let timeout = seconds(input.timeout, "timeout")
        .map_err(|err| rmcp::ErrorData::invalid_params(err.to_string(), None))?;
    let span = info_span!("dap_wait_for_event", name = %input.name, timeout = input.timeout);

    async move {
        let outcome = state.sessions.wait_for_event(&input.name, timeout).await;
        tool_result("dap_wait_for_event", outcome)
    }
    .instrument(span)
    .await
}
