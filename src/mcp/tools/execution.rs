//! Execution-control tool handlers: `dap_continue` and the three steps.

use std::sync::Arc;

use rmcp::handler::server::tool::ToolCallContext;
use rmcp::model::CallToolResult;
use tracing::{info_span, Instrument};

use crate::mcp::handler::DebugBridgeServer;
use crate::mcp::tools::util::{parse_input, tool_result};
use crate::models::execution::ExecutionCommand;

/// Optional thread override shared by thread-scoped tools.
#[derive(Debug, Default, serde::Deserialize)]
pub(crate) struct ThreadInput {
    /// Thread to act on; defaults to the last stopped thread.
    #[serde(default)]
    pub(crate) thread_id: Option<i64>,
}

/// Handle an execution-control tool call.
///
/// # Errors
///
/// Returns `rmcp::ErrorData` for malformed arguments.
pub async fn handle(
    context: ToolCallContext<'_, DebugBridgeServer>,
    command: ExecutionCommand,
) -> Result<CallToolResult, rmcp::ErrorData> {
    let state = Arc::clone(context.service.state());
    let tool = tool_name(command);
    let input: ThreadInput = parse_input(context, tool)?;
    let span = info_span!("execution", tool, thread_id = ?input.thread_id);

    async move { tool_result(tool, state.sessions.execute(command, input.thread_id).await) }
        .instrument(span)
        .await
}

fn tool_name(command: ExecutionCommand) -> &'static str {
    match command {
        ExecutionCommand::Continue => "dap_continue",
        ExecutionCommand::StepOver => "dap_step_over",
        ExecutionCommand::StepIn => "dap_step_in",
        ExecutionCommand::StepOut => "dap_step_out",
    }
}
