//! Unit tests for the advertised MCP tool catalog.

use std::collections::HashSet;
use std::sync::Arc;

use rmcp::handler::server::ServerHandler;

use agent_debug_bridge::config::GlobalConfig;
use agent_debug_bridge::mcp::handler::{AppState, DebugBridgeServer};

const EXPECTED_TOOLS: &[&str] = &[
    "dap_launch",
    "dap_set_breakpoints",
    "dap_list_breakpoints",
    "dap_continue",
    "dap_step_over",
    "dap_step_in",
    "dap_step_out",
    "dap_locals",
    "dap_last_stopped_event",
    "dap_wait_for_event",
    "dap_shutdown",
    "dap_validate_breakpoint_line",
    "read_text_file",
    "run_tests_json",
    "run_tests_focus",
];

#[test]
fn catalog_lists_every_tool_once() {
    let tools = DebugBridgeServer::all_tools();
    let names: Vec<String> = tools.iter().map(|tool| tool.name.to_string()).collect();
    let unique: HashSet<&String> = names.iter().collect();

    assert_eq!(unique.len(), names.len(), "tool names must be unique: {names:?}");
    for expected in EXPECTED_TOOLS {
        assert!(names.iter().any(|name| name == expected), "missing tool {expected}");
    }
    assert_eq!(names.len(), EXPECTED_TOOLS.len());
}

#[test]
fn every_tool_has_object_schema_and_description() {
    for tool in DebugBridgeServer::all_tools() {
        assert_eq!(
            tool.input_schema.get("type").and_then(serde_json::Value::as_str),
            Some("object"),
            "{} must take an object",
            tool.name
        );
        assert!(
            tool.description.as_deref().is_some_and(|d| !d.is_empty()),
            "{} must be described",
            tool.name
        );
    }
}

#[test]
fn launch_requires_program() {
    let launch = DebugBridgeServer::all_tools()
        .into_iter()
        .find(|tool| tool.name == "dap_launch")
        .expect("dap_launch advertised");
    assert_eq!(launch.input_schema["required"], serde_json::json!(["program"]));
}

#[test]
fn server_advertises_tool_capability() {
    let config = Arc::new(GlobalConfig::from_toml_str("").expect("defaults"));
    let server = DebugBridgeServer::new(Arc::new(AppState::new(config)));

    let info = server.get_info();

    assert!(info.capabilities.tools.is_some(), "tools capability must be enabled");
    assert!(info.instructions.is_some());
}
