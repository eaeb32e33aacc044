//! File tools: `read_text_file` and `dap_validate_breakpoint_line`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rmcp::handler::server::tool::ToolCallContext;
use rmcp::model::CallToolResult;
use serde::Serialize;
use tracing::{info_span, Instrument};

use crate::mcp::handler::DebugBridgeServer;
use crate::mcp::tools::util::{parse_input, tool_result, truncate_text};
use crate::orchestrator::line_hints::validate_breakpoint_line;
use crate::paths::{resolve_target, validate_path};
use crate::{AppError, Result};

/// Default read budget of `read_text_file`.
const DEFAULT_MAX_BYTES: usize = 65_536;

#[derive(Debug, serde::Deserialize)]
struct ReadTextFileInput {
    /// File to read, confined to the project root.
    path: String,
    /// Maximum bytes of content returned.
    #[serde(default = "default_max_bytes")]
    max_bytes: usize,
}

fn default_max_bytes() -> usize {
    DEFAULT_MAX_BYTES
}

#[derive(Debug, serde::Deserialize)]
struct ValidateLineInput {
    /// Source file to inspect.
    source_path: String,
    /// 1-based line number.
    line: u32,
}

/// Contents returned by `read_text_file`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TextFile {
    /// Resolved path.
    pub path: PathBuf,
    /// File text, possibly truncated.
    pub content: String,
    /// Whether `content` was cut at `max_bytes`.
    pub truncated: bool,
}

/// Read a UTF-8 file under `project_root`, returning at most `max_bytes`.
///
/// # Errors
///
/// - `AppError::PathViolation` if the path escapes the project root.
/// - `AppError::TargetNotFound` if it does not exist.
/// - `AppError::InvalidInput` if it is not UTF-8 text.
/// - `AppError::Io` on read failures.
pub async fn read_text_file(project_root: &Path, requested: &str, max_bytes: usize) -> Result<TextFile> {
    let path = validate_path(project_root, requested)?;
    if !path.is_file() {
        return Err(AppError::TargetNotFound {
            requested: requested.to_owned(),
            candidates: vec![path],
            suggestions: Vec::new(),
        });
    }

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|err| AppError::Io(format!("cannot read {}: {err}", path.display())))?;
    let text = String::from_utf8(bytes)
        .map_err(|_| AppError::InvalidInput(format!("{} is not UTF-8 text", path.display())))?;

    let (content, truncated) = truncate_text(&text, max_bytes);
    Ok(TextFile {
        content: content.to_owned(),
        path,
        truncated,
    })
}

/// Handle the `read_text_file` tool call.
///
/// # Errors
///
/// Returns `rmcp::ErrorData` for malformed arguments.
pub async fn handle_read(
    context: ToolCallContext<'_, DebugBridgeServer>,
) -> std::result::Result<CallToolResult, rmcp::ErrorData> {
    let state = Arc::clone(context.service.state());
    let input: ReadTextFileInput = parse_input(context, "read_text_file")?;
    let span = info_span!("read_text_file", path = %input.path, max_bytes = input.max_bytes);

    async move {
        let outcome =
            read_text_file(state.config.project_root(), &input.path, input.max_bytes).await;
        tool_result("read_text_file", outcome)
    }
    .instrument(span)
    .await
}

/// Handle the `dap_validate_breakpoint_line` tool call.
///
/// # Errors
///
/// Returns `rmcp::ErrorData` for malformed arguments.
pub async fn handle_validate_line(
    context: ToolCallContext<'_, DebugBridgeServer>,
) -> std::result::Result<CallToolResult, rmcp::ErrorData> {
    let state = Arc::clone(context.service.state());
    let input: ValidateLineInput = parse_input(context, "dap_validate_breakpoint_line")?;
    let span = info_span!(
        "dap_validate_breakpoint_line",
        source = %input.source_path,
        line = input.line
    );

    async move {
        let outcome = match resolve_target(&input.source_path, state.config.project_root(), None) {
            Ok(path) => validate_breakpoint_line(&path, input.line).await,
            Err(err) => Err(err),
        };
        tool_result("dap_validate_breakpoint_line", outcome)
    }
    .instrument(span)
    .await
}
