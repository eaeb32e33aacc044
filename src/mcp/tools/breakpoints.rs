//! `dap_set_breakpoints` and `dap_list_breakpoints` MCP tool handlers.

use std::sync::Arc;

use rmcp::handler::server::tool::ToolCallContext;
use rmcp::model::CallToolResult;
use tracing::{info_span, Instrument};

use crate::mcp::handler::DebugBridgeServer;
use crate::mcp::tools::util::{parse_input, tool_result};

/// Input parameters for `dap_set_breakpoints`.
#[derive(Debug, serde::Deserialize)]
struct SetBreakpointsInput {
    /// Source file, absolute or relative.
    source: String,
    /// Requested 1-based lines; empty clears the source.
    #[serde(default)]
    lines: Vec<u32>,
}

/// Handle the `dap_set_breakpoints` tool call.
///
/// # Errors
///
/// Returns `rmcp::ErrorData` for malformed arguments.
pub async fn handle_set(
    context: ToolCallContext<'_, DebugBridgeServer>,
) -> Result<CallToolResult, rmcp::ErrorData> {
    let state = Arc::clone(context.service.state());
    let input: SetBreakpointsInput = parse_input(context, "dap_set_breakpoints")?;
    let span = info_span!("dap_set_breakpoints", source = %input.source, lines = ?input.lines);

    async move {
        let outcome = state.sessions.set_breakpoints(&input.source, &input.lines).await;
        tool_result("dap_set_breakpoints", outcome)
    }
    .instrument(span)
    .await
}

/// Handle the `dap_list_breakpoints` tool call.
///
/// # Errors
///
/// Returns `rmcp::ErrorData` if the listing cannot be serialized.
pub async fn handle_list(
    context: ToolCallContext<'_, DebugBridgeServer>,
) -> Result<CallToolResult, rmcp::ErrorData> {
    let state = Arc::clone(context.service.state());
    tool_result("dap_list_breakpoints", state.sessions.list_breakpoints().await)
}
