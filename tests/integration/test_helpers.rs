//! Shared fixtures for session-level integration tests.
//!
//! Provides a scripted in-memory debug adapter reachable through
//! [`FakeConnector`], a project directory with a program and a module, and
//! configuration tuned for fast timeouts. The adapter speaks real
//! `Content-Length` framing over a `tokio::io::duplex` pipe, so everything
//! above the byte stream runs exactly as in production.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::BytesMut;
use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tokio_util::codec::{Encoder, FramedRead};
use tokio_util::sync::CancellationToken;

use agent_debug_bridge::config::GlobalConfig;
use agent_debug_bridge::dap::codec::DapCodec;
use agent_debug_bridge::dap::connector::{AdapterConnector, AdapterLink};
use agent_debug_bridge::dap::message::{Event, Message, Request, Response};
use agent_debug_bridge::orchestrator::session_manager::SessionManager;
use agent_debug_bridge::Result;

/// Delay before a scheduled `stopped` event reaches the bridge.
///
/// Long enough for the launch sequence to finish phase 2 and start waiting.
pub const STOP_DELAY: Duration = Duration::from_millis(150);

// ── Adapter log ───────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct LogInner {
    received: Vec<Message>,
    sent: Vec<Message>,
}

/// Everything the fake adapter received from and sent to the bridge.
#[derive(Debug, Clone, Default)]
pub struct AdapterLog {
    inner: Arc<Mutex<LogInner>>,
}

impl AdapterLog {
    fn push_received(&self, message: Message) {
        self.inner.lock().expect("log lock").received.push(message);
    }

    fn push_sent(&self, message: Message) {
        self.inner.lock().expect("log lock").sent.push(message);
    }

    /// Requests from the bridge, in arrival order.
    pub fn requests(&self) -> Vec<Request> {
        self.inner
            .lock()
            .expect("log lock")
            .received
            .iter()
            .filter_map(|message| match message {
                Message::Request(request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    /// Commands of [`requests`](Self::requests).
    pub fn commands(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.command).collect()
    }

    /// Number of requests for `command`.
    pub fn count(&self, command: &str) -> usize {
        self.commands().iter().filter(|c| *c == command).count()
    }

    /// Replies the bridge sent to reverse requests.
    pub fn responses(&self) -> Vec<Response> {
        self.inner
            .lock()
            .expect("log lock")
            .received
            .iter()
            .filter_map(|message| match message {
                Message::Response(response) => Some(response.clone()),
                _ => None,
            })
            .collect()
    }

    /// Whether an event called `name` has been written to the bridge.
    pub fn has_sent_event(&self, name: &str) -> bool {
        self.inner
            .lock()
            .expect("log lock")
            .sent
            .iter()
            .any(|message| matches!(message, Message::Event(event) if event.event == name))
    }

    /// Poll until the bridge has answered a reverse request for `command`.
    pub async fn wait_for_response(&self, command: &str, timeout: Duration) -> Option<Response> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(found) = self.responses().into_iter().find(|r| r.command == command) {
                return Some(found);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

// ── Scripting ─────────────────────────────────────────────────────────────────

/// One action of the fake adapter in reply to a request.
#[derive(Debug)]
pub enum Step {
    /// Write a message now.
    Send(Message),
    /// Write a message after a delay, without blocking later requests.
    Later(Duration, Message),
    /// Write raw bytes, framed or not.
    Raw(Vec<u8>),
    /// Close both directions of the stream.
    Hangup,
}

/// Behaviour of one adapter connection.
pub trait Script: Send {
    /// Steps to perform for `request`.
    fn handle(&mut self, request: &Request, log: &AdapterLog) -> Vec<Step>;
}

impl<F> Script for F
where
    F: FnMut(&Request, &AdapterLog) -> Vec<Step> + Send,
{
    fn handle(&mut self, request: &Request, log: &AdapterLog) -> Vec<Step> {
        self(request, log)
    }
}

/// Successful response to `request`.
pub fn respond(request: &Request, body: Value) -> Step {
    Step::Send(Message::Response(Response {
        seq: 0,
        request_seq: request.seq,
        success: true,
        command: request.command.clone(),
        message: None,
        body: Some(body),
    }))
}

/// Rejection of `request` carrying `message`.
pub fn reject(request: &Request, message: &str) -> Step {
    Step::Send(Message::Response(Response {
        seq: 0,
        request_seq: request.seq,
        success: false,
        command: request.command.clone(),
        message: Some(message.to_owned()),
        body: Some(json!({ "error": { "id": 1, "format": message } })),
    }))
}

/// Event message called `name`.
pub fn event(name: &str, body: Value) -> Message {
    Message::Event(Event {
        seq: 0,
        event: name.to_owned(),
        body: Some(body),
    })
}

/// Body of a breakpoint stop on thread 1.
pub fn breakpoint_stop() -> Message {
    event(
        "stopped",
        json!({ "reason": "breakpoint", "threadId": 1, "allThreadsStopped": true }),
    )
}

// ── debugpy-like script ───────────────────────────────────────────────────────

/// When a source's breakpoints are reported as verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyWhen {
    /// From the first `setBreakpoints`.
    Always,
    /// Once `initialized` has been sent.
    AfterInitialized,
    /// Once the debuggee has stopped.
    AfterStop,
    /// Never.
    Never,
}

/// Knobs of [`DebugpyLike`].
#[derive(Debug, Clone)]
pub struct Behavior {
    /// Default verification rule.
    pub verify: VerifyWhen,
    /// Per file name overrides of `verify`.
    pub verify_by_name: HashMap<String, VerifyWhen>,
    /// Send `initialized` right after `initialize` instead of after `launch`.
    pub initialized_early: bool,
    /// Never send `initialized`.
    pub silent_initialized: bool,
    /// Schedule a breakpoint stop once `configurationDone` arrives.
    pub stop_after_configuration: bool,
    /// Thread ids reported by `threads`.
    pub threads: Vec<i64>,
    /// Reject `launch` with this message.
    pub reject_launch: Option<String>,
    /// Reject `configurationDone`.
    pub reject_configuration_done: bool,
    /// Reject `setExceptionBreakpoints` until `initialized` was sent.
    pub exceptions_after_initialized: bool,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            verify: VerifyWhen::AfterInitialized,
            verify_by_name: HashMap::new(),
            initialized_early: false,
            silent_initialized: false,
            stop_after_configuration: true,
            threads: vec![1],
            reject_launch: None,
            reject_configuration_done: false,
            exceptions_after_initialized: false,
        }
    }
}

/// A scripted adapter modelled on debugpy's observable behaviour.
#[derive(Debug)]
pub struct DebugpyLike {
    behavior: Behavior,
}

impl DebugpyLike {
    /// Script with the given knobs.
    pub fn new(behavior: Behavior) -> Self {
        Self { behavior }
    }

    fn verified(&self, source_name: &str, log: &AdapterLog) -> bool {
        let rule = self
            .behavior
            .verify_by_name
            .get(source_name)
            .copied()
            .unwrap_or(self.behavior.verify);
        match rule {
            VerifyWhen::Always => true,
            VerifyWhen::AfterInitialized => log.has_sent_event("initialized"),
            VerifyWhen::AfterStop => log.has_sent_event("stopped"),
            VerifyWhen::Never => false,
        }
    }
}

impl Script for DebugpyLike {
    #[allow(clippy::too_many_lines)]
    fn handle(&mut self, request: &Request, log: &AdapterLog) -> Vec<Step> {
        let args = request.arguments.clone().unwrap_or(Value::Null);
        match request.command.as_str() {
            "initialize" => {
                let mut steps = vec![respond(
                    request,
                    json!({
                        "supportsConfigurationDoneRequest": true,
                        "exceptionBreakpointFilters": [
                            { "filter": "raised", "label": "Raised Exceptions" },
                            { "filter": "uncaught", "label": "Uncaught Exceptions" }
                        ]
                    }),
                )];
                if self.behavior.initialized_early && !self.behavior.silent_initialized {
                    steps.push(Step::Send(event("initialized", json!({}))));
                }
                steps
            }
            "launch" => {
                if let Some(message) = &self.behavior.reject_launch {
                    return vec![reject(request, message)];
                }
                let mut steps = Vec::new();
                if !self.behavior.initialized_early && !self.behavior.silent_initialized {
                    steps.push(Step::Send(event("initialized", json!({}))));
                }
                steps.push(respond(request, json!({})));
                steps
            }
            "setBreakpoints" => {
                let name = args["source"]["name"].as_str().unwrap_or_default().to_owned();
                let verified = self.verified(&name, log);
                let breakpoints: Vec<Value> = args["breakpoints"]
                    .as_array()
                    .cloned()
                    .unwrap_or_default()
                    .into_iter()
                    .enumerate()
                    .map(|(i, bp)| json!({ "id": i + 1, "verified": verified, "line": bp["line"] }))
                    .collect();
                vec![respond(request, json!({ "breakpoints": breakpoints }))]
            }
            "setExceptionBreakpoints" => {
                if self.behavior.exceptions_after_initialized && !log.has_sent_event("initialized") {
                    vec![reject(request, "exception filters not accepted yet")]
                } else {
                    vec![respond(request, json!({}))]
                }
            }
            "configurationDone" => {
                if self.behavior.reject_configuration_done {
                    return vec![reject(request, "configuration already done")];
                }
                let mut steps = vec![respond(request, json!({}))];
                if self.behavior.stop_after_configuration {
                    steps.push(Step::Later(STOP_DELAY, breakpoint_stop()));
                }
                steps
            }
            "threads" => {
                let threads: Vec<Value> = self
                    .behavior
                    .threads
                    .iter()
                    .map(|id| json!({ "id": id, "name": format!("Thread-{id}") }))
                    .collect();
                vec![respond(request, json!({ "threads": threads }))]
            }
            "continue" => vec![
                respond(request, json!({ "allThreadsContinued": true })),
                Step::Later(Duration::from_millis(20), event("terminated", json!({}))),
            ],
            "next" | "stepIn" | "stepOut" => vec![
                respond(request, json!({})),
                Step::Later(
                    Duration::from_millis(20),
                    event("stopped", json!({ "reason": "step", "threadId": args["threadId"] })),
                ),
            ],
            "stackTrace" => vec![respond(
                request,
                json!({
                    "stackFrames": [
                        { "id": 11, "name": "main", "line": 6, "column": 1 },
                        { "id": 12, "name": "<module>", "line": 9, "column": 1 }
                    ],
                    "totalFrames": 2
                }),
            )],
            "scopes" => vec![respond(
                request,
                json!({
                    "scopes": [
                        { "name": "Globals", "variablesReference": 22, "expensive": false },
                        { "name": "Locals", "variablesReference": 21, "expensive": false }
                    ]
                }),
            )],
            "variables" => {
                let variables = if args["variablesReference"] == 21 {
                    json!([
                        { "name": "value", "value": "1", "type": "int", "variablesReference": 0 },
                        { "name": "items", "value": "[1, 2]", "type": "list", "variablesReference": 30 }
                    ])
                } else {
                    json!([])
                };
                vec![respond(request, json!({ "variables": variables }))]
            }
            "disconnect" => vec![respond(request, json!({})), Step::Hangup],
            other => vec![reject(request, &format!("unsupported command '{other}'"))],
        }
    }
}

// ── Connector ─────────────────────────────────────────────────────────────────

type ScriptFactory = Arc<dyn Fn() -> Box<dyn Script> + Send + Sync>;

/// Connector handing out in-memory adapters driven by a script.
pub struct FakeConnector {
    factory: ScriptFactory,
    log: AdapterLog,
    connections: AtomicUsize,
}

impl FakeConnector {
    /// Connector whose every connection runs a fresh script from `factory`.
    pub fn new(factory: impl Fn() -> Box<dyn Script> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            factory: Arc::new(factory),
            log: AdapterLog::default(),
            connections: AtomicUsize::new(0),
        })
    }

    /// Connector running [`DebugpyLike`] with `behavior`.
    pub fn debugpy(behavior: Behavior) -> Arc<Self> {
        Self::new(move || Box::new(DebugpyLike::new(behavior.clone())) as Box<dyn Script>)
    }

    /// Log shared by every connection.
    pub fn log(&self) -> &AdapterLog {
        &self.log
    }

    /// Number of adapters connected so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

impl AdapterConnector for FakeConnector {
    fn connect(
        &self,
        _session_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<AdapterLink>> + Send + '_>> {
        Box::pin(async move {
            self.connections.fetch_add(1, Ordering::SeqCst);
            let (bridge_end, adapter_end) = tokio::io::duplex(64 * 1024);
            tokio::spawn(run_fake_adapter(adapter_end, (self.factory)(), self.log.clone()));
            let (reader, writer) = tokio::io::split(bridge_end);
            Ok(AdapterLink {
                reader: Box::new(reader),
                writer: Box::new(writer),
                process: None,
            })
        })
    }
}

enum Outbound {
    Message(Message),
    Raw(Vec<u8>),
}

async fn run_fake_adapter(stream: DuplexStream, mut script: Box<dyn Script>, log: AdapterLog) {
    let (read_half, mut write_half) = tokio::io::split(stream);
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
    let hangup = CancellationToken::new();

    let writer = {
        let log = log.clone();
        let hangup = hangup.clone();
        tokio::spawn(async move {
            let mut codec = DapCodec::new();
            let mut seq = 1000;
            loop {
                let outbound = tokio::select! {
                    biased;
                    () = hangup.cancelled() => break,
                    next = rx.recv() => match next {
                        Some(outbound) => outbound,
                        None => break,
                    },
                };
                let bytes = match outbound {
                    Outbound::Message(mut message) => {
                        seq += 1;
                        match &mut message {
                            Message::Request(m) => m.seq = seq,
                            Message::Response(m) => m.seq = seq,
                            Message::Event(m) => m.seq = seq,
                        }
                        log.push_sent(message.clone());
                        let mut buf = BytesMut::new();
                        codec.encode(message, &mut buf).expect("encode");
                        buf.to_vec()
                    }
                    Outbound::Raw(bytes) => bytes,
                };
                if write_half.write_all(&bytes).await.is_err() {
                    break;
                }
            }
            let _ = write_half.shutdown().await;
        })
    };

    let mut framed = FramedRead::new(read_half, DapCodec::new());
    'frames: while let Some(Ok(body)) = framed.next().await {
        let Ok(message) = serde_json::from_slice::<Message>(&body) else {
            continue;
        };
        log.push_received(message.clone());
        let Message::Request(request) = message else {
            continue;
        };
        for step in script.handle(&request, &log) {
            match step {
                Step::Send(message) => {
                    let _ = tx.send(Outbound::Message(message));
                }
                Step::Later(delay, message) => {
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = tx.send(Outbound::Message(message));
                    });
                }
                Step::Raw(bytes) => {
                    let _ = tx.send(Outbound::Raw(bytes));
                }
                Step::Hangup => {
                    // Let already queued replies go out before closing.
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    hangup.cancel();
                    break 'frames;
                }
            }
        }
    }
    drop(framed);
    drop(tx);
    hangup.cancel();
    let _ = writer.await;
}

// ── Project and configuration ─────────────────────────────────────────────────

/// Program source; line 6 is inside `main`.
pub const APP_SOURCE: &str = "\
import pkg.helper


def main():
    # entry
    value = pkg.helper.double(1)
    return value


main()
";

/// Module source; line 2 is the body of `double`.
pub const HELPER_SOURCE: &str = "def double(x):\n    return x * 2\n";

/// Temporary project with `app.py` and `pkg/helper.py`.
pub struct Project {
    dir: tempfile::TempDir,
}

impl Project {
    /// Create the project files.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("app.py"), APP_SOURCE).expect("write app.py");
        std::fs::create_dir_all(dir.path().join("pkg")).expect("mkdir pkg");
        std::fs::write(dir.path().join("pkg/__init__.py"), "").expect("write __init__");
        std::fs::write(dir.path().join("pkg/helper.py"), HELPER_SOURCE).expect("write helper");
        Self { dir }
    }

    /// Canonical project root.
    pub fn root(&self) -> PathBuf {
        self.dir.path().canonicalize().expect("canonical root")
    }

    /// Canonical path of a project file.
    pub fn file(&self, relative: &str) -> PathBuf {
        self.root().join(relative)
    }

    /// Configuration rooted here with `handshake` and optional filters.
    pub fn config_with(&self, handshake: &str, exception_filters: &[&str]) -> GlobalConfig {
        let filters: Vec<String> = exception_filters.iter().map(|f| format!("\"{f}\"")).collect();
        let toml = format!(
            r#"
project_root = '{root}'

[adapter]
command = "fake-adapter"
handshake = "{handshake}"
exception_filters = [{filters}]

[timeouts]
request_seconds = 2
initialized_seconds = 1
breakpoint_seconds = 2
disconnect_millis = 300
shutdown_grace_seconds = 1
"#,
            root = self.root().display(),
            filters = filters.join(", "),
        );
        GlobalConfig::from_toml_str(&toml).expect("valid test config")
    }

    /// Default configuration: launch-first handshake, no exception filters.
    pub fn config(&self) -> GlobalConfig {
        self.config_with("launch-first", &[])
    }

    /// Session manager over `connector` with the default configuration.
    pub fn manager(&self, connector: &Arc<FakeConnector>) -> SessionManager {
        self.manager_with(self.config(), connector)
    }

    /// Session manager over `connector` with `config`.
    pub fn manager_with(&self, config: GlobalConfig, connector: &Arc<FakeConnector>) -> SessionManager {
        let connector: Arc<dyn AdapterConnector> = connector.clone();
        SessionManager::new(Arc::new(config), connector)
    }
}

/// Framed bytes of a body that is not a valid message.
pub fn malformed_frame() -> Vec<u8> {
    let body = "{\"seq\":";
    format!("Content-Length: {}\r\n\r\n{body}", body.len()).into_bytes()
}

/// Whether `path` names the same file as `expected`.
pub fn same_file(path: &Path, expected: &Path) -> bool {
    path.canonicalize().ok() == expected.canonicalize().ok()
}
