//! Shared utilities for MCP tool handlers.

use rmcp::handler::server::tool::ToolCallContext;
use rmcp::model::{CallToolResult, Content};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::mcp::handler::DebugBridgeServer;
use crate::AppError;

/// Deserialize the tool arguments into `T`.
///
/// # Errors
///
/// Returns `invalid_params` naming `tool` when the arguments do not match.
pub fn parse_input<T: DeserializeOwned>(
    context: ToolCallContext<'_, DebugBridgeServer>,
    tool: &str,
) -> Result<T, rmcp::ErrorData> {
    let args: serde_json::Map<String, Value> = context.arguments.unwrap_or_default();
    serde_json::from_value(Value::Object(args)).map_err(|err| {
        rmcp::ErrorData::invalid_params(format!("invalid {tool} parameters: {err}"), None)
    })
}

/// Successful result carrying `body` as JSON content.
///
/// # Errors
///
/// Returns `internal_error` if `body` cannot be serialized.
pub fn json_result<T: Serialize>(tool: &str, body: &T) -> Result<CallToolResult, rmcp::ErrorData> {
    let value = serde_json::to_value(body).map_err(|err| {
        rmcp::ErrorData::internal_error(format!("failed to serialize {tool} response: {err}"), None)
    })?;
    Ok(CallToolResult::success(vec![Content::json(value)?]))
}

/// Structured payload describing a domain failure.
#[must_use]
pub fn error_payload(err: &AppError) -> Value {
    let mut detail = json!({
        "origin": err.origin(),
        "kind": err.kind(),
        "message": err.to_string(),
        "retryable": err.is_retryable(),
    });
    if let AppError::TargetNotFound {
        requested,
        candidates,
        suggestions,
    } = err
    {
        detail["requested"] = json!(requested);
        detail["candidates"] = json!(candidates);
        detail["suggestions"] = json!(suggestions);
        detail["hint"] = json!(if suggestions.is_empty() {
            "Pass an absolute path or a path relative to the project root."
        } else {
            "A file with the same name exists elsewhere; retry with one of the suggestions."
        });
    }
    json!({ "error": detail })
}

/// Convert a domain outcome into a tool result.
///
/// Failures become error results with [`error_payload`] so the agent can
/// read the reason; they are not protocol errors.
///
/// # Errors
///
/// Returns `internal_error` if a payload cannot be serialized.
pub fn tool_result<T: Serialize>(
    tool: &str,
    outcome: crate::Result<T>,
) -> Result<CallToolResult, rmcp::ErrorData> {
    match outcome {
        Ok(body) => json_result(tool, &body),
        Err(err) => {
            warn!(tool, kind = err.kind(), %err, "tool failed");
            Ok(CallToolResult::error(vec![Content::json(error_payload(&err))?]))
        }
    }
}

/// Prefix of `text` no longer than `max_bytes`, cut at a char boundary.
///
/// The flag reports whether anything was cut.
#[must_use]
pub fn truncate_text(text: &str, max_bytes: usize) -> (&str, bool) {
    if text.len() <= max_bytes {
        return (text, false);
    }
    let boundary = text
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|&i| i <= max_bytes)
        .last()
        .unwrap_or(0);
    (&text[..boundary], true)
}
