//! MCP server handler, shared application state, and tool router.

use std::future::Future;
use std::sync::Arc;

use rmcp::handler::server::{
    tool::{ToolCallContext, ToolRoute, ToolRouter},
    ServerHandler,
};
use rmcp::model::{
    CallToolRequestParam, CallToolResult, ListToolsResult, PaginatedRequestParam,
    ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::{RequestContext, RoleServer};
use tracing::info_span;

use crate::config::GlobalConfig;
use crate::mcp::tools;
use crate::models::execution::ExecutionCommand;
use crate::orchestrator::session_manager::SessionManager;

/// Shared application state accessible by all MCP tool handlers.
#[derive(Debug)]
pub struct AppState {
    /// Global configuration.
    pub config: Arc<GlobalConfig>,
    /// Owner of the active debug session.
    pub sessions: SessionManager,
}

impl AppState {
    /// State whose sessions spawn the configured adapter.
    #[must_use]
    pub fn new(config: Arc<GlobalConfig>) -> Self {
        let sessions = SessionManager::with_process_connector(Arc::clone(&config));
        Self { config, sessions }
    }
}

/// MCP server exposing the debug bridge tools.
#[derive(Debug)]
pub struct DebugBridgeServer {
    state: Arc<AppState>,
}

impl DebugBridgeServer {
    /// Create a new MCP server bound to shared application state.
    #[must_use]
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Access the shared application state.
    #[must_use]
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    fn tool_router() -> ToolRouter<Self> {
        let mut router = ToolRouter::new();

        for tool in Self::all_tools() {
            let name = tool.name.to_string();
            match name.as_str() {
                "dap_launch" => {
                    router.add_route(ToolRoute::new_dyn(tool, |context| {
                        Box::pin(tools::launch::handle(context))
                    }));
                }
                "dap_set_breakpoints" => {
                    router.add_route(ToolRoute::new_dyn(tool, |context| {
                        Box::pin(tools::breakpoints::handle_set(context))
                    }));
                }
                "dap_list_breakpoints" => {
                    router.add_route(ToolRoute::new_dyn(tool, |context| {
                        Box::pin(tools::breakpoints::handle_list(context))
                    }));
                }
                "dap_continue" => {
                    router.add_route(ToolRoute::new_dyn(tool, |context| {
                        Box::pin(tools::execution::handle(context, ExecutionCommand::Continue))
                    }));
                }
                "dap_step_over" => {
                    router.add_route(ToolRoute::new_dyn(tool, |context| {
                        Box::pin(tools::execution::handle(context, ExecutionCommand::StepOver))
                    }));
                }
                "dap_step_in" => {
                    router.add_route(ToolRoute::new_dyn(tool, |context| {
                        Box::pin(tools::execution::handle(context, ExecutionCommand::StepIn))
                    }));
                }
                "dap_step_out" => {
                    router.add_route(ToolRoute::new_dyn(tool, |context| {
                        Box::pin(tools::execution::handle(context, ExecutionCommand::StepOut))
                    }));
                }
                "dap_locals" => {
                    router.add_route(ToolRoute::new_dyn(tool, |context| {
                        Box::pin(tools::inspection::handle_locals(context))
                    }));
                }
                "dap_last_stopped_event" => {
                    router.add_route(ToolRoute::new_dyn(tool, |context| {
                        Box::pin(tools::inspection::handle_last_stopped_event(context))
                    }));
                }
                "dap_wait_for_event" => {
                    router.add_route(ToolRoute::new_dyn(tool, |context| {
                        Box::pin(tools::inspection::handle_wait_for_event(context))
                    }));
                }
                "dap_shutdown" => {
                    router.add_route(ToolRoute::new_dyn(tool, |context| {
                        Box::pin(tools::shutdown::handle(context))
                    }));
                }
                "dap_validate_breakpoint_line" => {
                    router.add_route(ToolRoute::new_dyn(tool, |context| {
                        Box::pin(tools::files::handle_validate_line(context))
                    }));
                }
                "read_text_file" => {
                    router.add_route(ToolRoute::new_dyn(tool, |context| {
                        Box::pin(tools::files::handle_read(context))
                    }));
                }
                "run_tests_json" => {
                    router.add_route(ToolRoute::new_dyn(tool, |context| {
                        Box::pin(tools::test_runs::handle_json(context))
                    }));
                }
                "run_tests_focus" => {
                    router.add_route(ToolRoute::new_dyn(tool, |context| {
                        Box::pin(tools::test_runs::handle_focus(context))
                    }));
                }
                _ => {
                    router.add_route(ToolRoute::new_dyn(tool, |_context| {
                        Box::pin(async {
                            Err(rmcp::ErrorData::internal_error(
                                "tool not implemented",
                                None,
                            ))
                        })
                    }));
                }
            }
        }

        router
    }

    /// Convert a `serde_json::Value::Object` into the `Arc<Map>` expected by `Tool`.
    fn schema(value: serde_json::Value) -> Arc<serde_json::Map<String, serde_json::Value>> {
        match value {
            serde_json::Value::Object(map) => Arc::new(map),
            _ => Arc::new(serde_json::Map::default()),
        }
    }

    fn tool(name: &'static str, description: &'static str, schema: serde_json::Value) -> Tool {
        Tool::new(name, description, Self::schema(schema))
    }

    fn thread_schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "thread_id": { "type": "integer", "description": "Defaults to the last stopped thread" }
            }
        })
    }

    /// Every tool the server advertises.
    #[allow(clippy::too_many_lines)]
    #[must_use]
    pub fn all_tools() -> Vec<Tool> {
        vec![
            Self::tool(
                "dap_launch",
                "Launch a program under the debug adapter, register breakpoints in \
                 phases, and optionally wait for the first stop. Replaces any active session.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "program": { "type": "string" },
                        "cwd": { "type": "string" },
                        "breakpoints": { "type": "array", "items": { "type": "integer", "minimum": 1 } },
                        "breakpoints_by_source": {
                            "type": "object",
                            "additionalProperties": { "type": "array", "items": { "type": "integer", "minimum": 1 } }
                        },
                        "stop_on_entry": { "type": "boolean", "default": false },
                        "wait_for_breakpoint": { "type": "boolean", "default": true },
                        "breakpoint_timeout": { "type": "number", "minimum": 0 },
                        "env": { "type": "object", "additionalProperties": { "type": "string" } }
                    },
                    "required": ["program"]
                }),
            ),
            Self::tool(
                "dap_set_breakpoints",
                "Replace the breakpoints of one source file in the active session. \
                 An empty list clears them.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "source": { "type": "string" },
                        "lines": { "type": "array", "items": { "type": "integer", "minimum": 1 } }
                    },
                    "required": ["source", "lines"]
                }),
            ),
            Self::tool(
                "dap_list_breakpoints",
                "List requested breakpoints and the per-source registration audit.",
                serde_json::json!({ "type": "object", "properties": {} }),
            ),
            Self::tool("dap_continue", "Resume execution of a thread.", Self::thread_schema()),
            Self::tool("dap_step_over", "Step over the current line.", Self::thread_schema()),
            Self::tool("dap_step_in", "Step into the call on the current line.", Self::thread_schema()),
            Self::tool("dap_step_out", "Step out of the current function.", Self::thread_schema()),
            Self::tool(
                "dap_locals",
                "Variables of the innermost frame's local scope.",
                Self::thread_schema(),
            ),
            Self::tool(
                "dap_last_stopped_event",
                "The most recent stop with its breakpoint snapshot, plus recorded protocol faults.",
                serde_json::json!({ "type": "object", "properties": {} }),
            ),
            Self::tool(
                "dap_wait_for_event",
                "Wait for the next adapter event of a given name. Events that arrived \
                 before the call and were not yet consumed satisfy it immediately.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "name": { "type": "string", "default": "stopped" },
                        "timeout": { "type": "number", "minimum": 0, "default": 5 }
                    }
                }),
            ),
            Self::tool(
                "dap_shutdown",
                "Disconnect the active session and terminate the adapter. Safe to repeat.",
                serde_json::json!({ "type": "object", "properties": {} }),
            ),
            Self::tool(
                "dap_validate_breakpoint_line",
                "Check whether a source line is a useful breakpoint location and \
                 suggest nearby alternatives.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "source_path": { "type": "string" },
                        "line": { "type": "integer", "minimum": 1 }
                    },
                    "required": ["source_path", "line"]
                }),
            ),
            Self::tool(
                "read_text_file",
                "Read a UTF-8 text file inside the project root.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string" },
                        "max_bytes": { "type": "integer", "minimum": 1, "default": 65536 }
                    },
                    "required": ["path"]
                }),
            ),
            Self::tool(
                "run_tests_json",
                "Run the project's tests and return the JSON report.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "args": { "type": "array", "items": { "type": "string" } }
                    }
                }),
            ),
            Self::tool(
                "run_tests_focus",
                "Run only the tests matching a keyword and return the JSON report.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "keyword": { "type": "string" }
                    },
                    "required": ["keyword"]
                }),
            ),
        ]
    }
}

impl ServerHandler for DebugBridgeServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(
                "Debug adapter bridge: launch a program, set breakpoints, step, and \
                 inspect locals. One session at a time."
                    .into(),
            ),
            ..ServerInfo::default()
        }
    }

    fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<CallToolResult, rmcp::ErrorData>> + Send + '_ {
        let router = Self::tool_router();
        let _span = info_span!("call_tool", tool = %request.name).entered();

        async move {
            router
                .call(ToolCallContext::new(self, request, context))
                .await
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<ListToolsResult, rmcp::ErrorData>> + Send + '_ {
        let tools = Self::all_tools();

        std::future::ready(Ok(ListToolsResult::with_all_items(tools)))
    }
}
