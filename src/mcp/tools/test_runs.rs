//! `run_tests_json` and `run_tests_focus` MCP tool handlers.

use std::sync::Arc;

use rmcp::handler::server::tool::ToolCallContext;
use rmcp::model::CallToolResult;
use tracing::{info_span, Instrument};

use crate::mcp::handler::DebugBridgeServer;
use crate::mcp::tools::util::{parse_input, tool_result};
use crate::test_runner::{run_tests, run_tests_focus};

#[derive(Debug, serde::Deserialize)]
struct RunTestsInput {
    /// Extra runner arguments.
    #[serde(default)]
    args: Vec<String>,
}

#[derive(Debug, serde::Deserialize)]
struct RunTestsFocusInput {
    /// Keyword selecting the tests to run.
    keyword: String,
}

/// Handle the `run_tests_json` tool call.
///
/// # Errors
///
/// Returns `rmcp::ErrorData` for malformed arguments.
pub async fn handle_json(
    context: ToolCallContext<'_, DebugBridgeServer>,
) -> Result<CallToolResult, rmcp::ErrorData> {
    let state = Arc::clone(context.service.state());
    let input: RunTestsInput = parse_input(context, "run_tests_json")?;
    let span = info_span!("run_tests_json", args = ?input.args);

    async move { tool_result("run_tests_json", run_tests(&state.config, &input.args).await) }
        .instrument(span)
        .await
}

/// Handle the `run_tests_focus` tool call.
///
/// # Errors
///
/// Returns `rmcp::ErrorData` for malformed arguments.
pub async fn handle_focus(
    context: ToolCallContext<'_, DebugBridgeServer>,
) -> Result<CallToolResult, rmcp::ErrorData> {
    let state = Arc::clone(context.service.state());
    let input: RunTestsFocusInput = parse_input(context, "run_tests_focus")?;
    let span = info_span!("run_tests_focus", keyword = %input.keyword);

    async move {
        tool_result(
            "run_tests_focus",
            run_tests_focus(&state.config, &input.keyword).await,
        )
    }
    .instrument(span)
    .await
}
