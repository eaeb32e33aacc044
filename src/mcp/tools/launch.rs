//! `dap_launch` MCP tool handler.
//!
//! Resolves the program, starts a fresh adapter session (replacing any
//! active one), registers breakpoints and optionally waits for the first
//! stop. The returned report carries the per-source registration audit.

use std::sync::Arc;

use rmcp::handler::server::tool::ToolCallContext;
use rmcp::model::CallToolResult;
use tracing::{info, info_span, Instrument};

use crate::mcp::handler::DebugBridgeServer;
use crate::mcp::tools::util::{parse_input, tool_result};
use crate::models::launch::LaunchRequest;

/// Handle the `dap_launch` tool call.
///
/// # Errors
///
/// Returns `rmcp::ErrorData` for malformed arguments; launch failures are
/// reported as error results.
pub async fn handle(
    context: ToolCallContext<'_, DebugBridgeServer>,
) -> Result<CallToolResult, rmcp::ErrorData> {
    let state = Arc::clone(context.service.state());
    let request: LaunchRequest = parse_input(context, "dap_launch")?;

    let span = info_span!(
        "dap_launch",
        program = %request.program,
        stop_on_entry = request.stop_on_entry,
        wait_for_breakpoint = request.wait_for_breakpoint,
    );

    async move {
        let outcome = state.sessions.launch(request).await;
        if let Ok(report) = &outcome {
            info!(
                session_id = %report.session_id,
                registrations = report.registrations.len(),
                "dap_launch completed"
            );
        }
        tool_result("dap_launch", outcome)
    }
    .instrument(span)
    .await
}
