//! `dap_shutdown` MCP tool handler.

use std::sync::Arc;

use rmcp::handler::server::tool::ToolCallContext;
use rmcp::model::CallToolResult;
use tracing::{info, info_span, Instrument};

use crate::mcp::handler::DebugBridgeServer;
use crate::mcp::tools::util::json_result;

/// Handle the `dap_shutdown` tool call. Never fails for lack of a session.
///
/// # Errors
///
/// Returns `rmcp::ErrorData` if the report cannot be serialized.
pub async fn handle(
    context: ToolCallContext<'_, DebugBridgeServer>,
) -> Result<CallToolResult, rmcp::ErrorData> {
    let state = Arc::clone(context.service.state());

    async move {
        let report = state.sessions.shutdown().await;
        info!(status = ?report.status, session_id = ?report.session_id, "dap_shutdown completed");
        json_result("dap_shutdown", &report)
    }
    .instrument(info_span!("dap_shutdown"))
    .await
}
