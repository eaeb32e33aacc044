//! Error types shared across the application.
//!
//! Every failure carries an origin so a calling agent can tell an
//! adapter-reported rejection apart from a failure inside the bridge.

use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Which side of the bridge produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorOrigin {
    /// The debug adapter reported the failure through its own success flag.
    Adapter,
    /// The bridge itself failed (transport, protocol, resolution, timeouts).
    Orchestrator,
}

/// Application error enumeration covering all domain failure modes.
#[derive(Debug, Clone)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Adapter process exited or its stream broke. Fatal to the session.
    Transport(String),
    /// Malformed or unmatched protocol message. The session may continue.
    Protocol(String),
    /// The adapter answered a request with `success == false`.
    Adapter {
        /// Command that was rejected.
        command: String,
        /// Message reported by the adapter.
        message: String,
    },
    /// A program, module source or working directory could not be resolved.
    TargetNotFound {
        /// Path as supplied by the caller.
        requested: String,
        /// Every absolute path that was tried, in order.
        candidates: Vec<PathBuf>,
        /// Files with the same name found under the project root.
        suggestions: Vec<PathBuf>,
    },
    /// A bounded wait elapsed.
    Timeout(String),
    /// The session was shut down while the operation was in flight.
    SessionClosed(String),
    /// No debug session is active.
    NoSession,
    /// Neither a cached stop nor a live thread listing yielded a thread.
    NoStoppableThread,
    /// File system path failed validation against the project root.
    PathViolation(String),
    /// Caller supplied arguments the bridge refuses to act on.
    InvalidInput(String),
    /// The external test runner failed to produce a report.
    TestRunner(String),
    /// MCP protocol or tool dispatch failure.
    Mcp(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl AppError {
    /// Side of the bridge that produced this error.
    #[must_use]
    pub fn origin(&self) -> ErrorOrigin {
        match self {
            Self::Adapter { .. } => ErrorOrigin::Adapter,
            _ => ErrorOrigin::Orchestrator,
        }
    }

    /// Stable camelCase tag used in tool results.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Transport(_) => "transportFault",
            Self::Protocol(_) => "protocolFault",
            Self::Adapter { .. } => "adapterRejection",
            Self::TargetNotFound { .. } => "targetNotFound",
            Self::Timeout(_) => "timeout",
            Self::SessionClosed(_) => "sessionClosed",
            Self::NoSession => "noSession",
            Self::NoStoppableThread => "noStoppableThread",
            Self::PathViolation(_) => "pathViolation",
            Self::InvalidInput(_) => "invalidInput",
            Self::TestRunner(_) => "testRunner",
            Self::Mcp(_) => "mcp",
            Self::Io(_) => "io",
        }
    }

    /// Whether this error invalidates the whole session rather than one call.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::SessionClosed(_))
    }

    /// Whether re-issuing the same call may succeed without relaunching.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Adapter { .. } | Self::Timeout(_) | Self::Protocol(_) | Self::NoStoppableThread
        )
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Adapter { command, message } => {
                write!(f, "adapter rejected '{command}': {message}")
            }
            Self::TargetNotFound {
                requested,
                candidates,
                ..
            } => write!(
                f,
                "target not found: {requested} ({} candidate(s) tried)",
                candidates.len()
            ),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::SessionClosed(msg) => write!(f, "session closed: {msg}"),
            Self::NoSession => write!(f, "no active debug session"),
            Self::NoStoppableThread => write!(f, "no stoppable thread"),
            Self::PathViolation(msg) => write!(f, "path violation: {msg}"),
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Self::TestRunner(msg) => write!(f, "test runner: {msg}"),
            Self::Mcp(msg) => write!(f, "mcp: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(format!("malformed json: {err}"))
    }
}
