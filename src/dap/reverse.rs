//! Answers for adapter-initiated (reverse) requests.
//!
//! Every reverse request gets a response. `runInTerminal` is honored by
//! spawning the requested command detached; every other command is refused
//! with `success: false` so the adapter can fall back instead of stalling.

use std::collections::HashMap;
use std::process::Stdio;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::{info, warn};

use crate::dap::message::Request;
use crate::{AppError, Result};

/// Reply to a reverse request, written back as a protocol response.
#[derive(Debug, Clone, PartialEq)]
pub struct ReverseReply {
    /// Value of the response's `success` flag.
    pub success: bool,
    /// Error message when `success` is false.
    pub message: Option<String>,
    /// Response body.
    pub body: Option<Value>,
}

impl ReverseReply {
    /// Successful reply carrying `body`.
    #[must_use]
    pub fn ok(body: Value) -> Self {
        Self {
            success: true,
            message: None,
            body: Some(body),
        }
    }

    /// Failed reply carrying `message`.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            body: None,
        }
    }
}

/// `runInTerminal` arguments. `args` may arrive as an argv list or, from
/// some adapters, as one command line.
#[derive(Debug, Deserialize)]
struct RunInTerminalArgs {
    #[serde(default)]
    cwd: Option<String>,
    args: CommandLine,
    #[serde(default)]
    env: HashMap<String, Option<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CommandLine {
    Argv(Vec<String>),
    Line(String),
}

impl CommandLine {
    fn into_argv(self) -> Vec<String> {
        match self {
            Self::Argv(argv) => argv,
            Self::Line(line) => line.split_whitespace().map(str::to_owned).collect(),
        }
    }
}

/// Produce the reply for a reverse request.
#[must_use]
pub fn answer_reverse_request(session_id: &str, request: &Request) -> ReverseReply {
    match request.command.as_str() {
        "runInTerminal" => match run_in_terminal(request.arguments.clone()) {
            Ok(pid) => {
                info!(session_id, pid, "runInTerminal target spawned");
                ReverseReply::ok(json!({ "processId": pid, "shellProcessId": 0 }))
            }
            Err(err) => {
                warn!(session_id, %err, "runInTerminal failed");
                ReverseReply::failed(err.to_string())
            }
        },
        other => {
            info!(session_id, command = other, "refusing unsupported reverse request");
            ReverseReply::failed(format!("client does not implement '{other}'"))
        }
    }
}

fn run_in_terminal(arguments: Option<Value>) -> Result<u32> {
    let args: RunInTerminalArgs = serde_json::from_value(arguments.unwrap_or(Value::Null))
        .map_err(|e| AppError::Protocol(format!("invalid runInTerminal arguments: {e}")))?;

    let argv = args.args.into_argv();
    let Some((program, rest)) = argv.split_first() else {
        return Err(AppError::Protocol("runInTerminal without a command".into()));
    };

    let mut cmd = Command::new(program);
    cmd.args(rest)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    if let Some(cwd) = args.cwd.filter(|cwd| !cwd.is_empty()) {
        cmd.current_dir(cwd);
    }
    for (key, value) in args.env {
        match value {
            Some(value) => cmd.env(key, value),
            None => cmd.env_remove(key),
        };
    }

    // Not kill_on_drop: the target outlives this handle and is owned by the
    // adapter from here on.
    let child = cmd
        .spawn()
        .map_err(|e| AppError::Io(format!("failed to spawn '{program}': {e}")))?;
    Ok(child.id().unwrap_or(0))
}
