//! Session lifecycle phases and shutdown reporting.

use serde::Serialize;

/// Progress of a session through the launch handshake.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LaunchPhase {
    /// Created, nothing sent.
    Idle,
    /// `initialize` in flight.
    Initializing,
    /// Pre-configuration breakpoint registration.
    ConfiguringBreakpoints,
    /// `configurationDone` in flight.
    AwaitingConfigurationDone,
    /// `launch` acknowledged.
    Launched,
    /// Waiting for the first stop.
    AwaitingFirstStop,
    /// Handshake complete.
    Ready,
    /// Transport loss or fatal adapter rejection.
    Aborted {
        /// What went wrong.
        reason: String,
    },
    /// Shut down on request.
    Closed,
}

impl LaunchPhase {
    /// Whether the session can no longer issue commands.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Aborted { .. } | Self::Closed)
    }
}

/// Whether shutdown found a session to stop.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ShutdownStatus {
    /// A session was stopped.
    Stopped,
    /// No session was ever started.
    NoSession,
}

/// Observable result of shutting a session down.
///
/// Repeated shutdowns return the same report.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ShutdownReport {
    /// Outcome.
    pub status: ShutdownStatus,
    /// Session that was stopped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Requests that were still awaiting a response.
    pub cancelled_calls: usize,
    /// Whether the adapter acknowledged `disconnect`.
    pub disconnect_acknowledged: bool,
    /// Adapter exit status, when a process was terminated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_status: Option<String>,
}

impl ShutdownReport {
    /// Report for a shutdown with no session.
    #[must_use]
    pub fn no_session() -> Self {
        Self {
            status: ShutdownStatus::NoSession,
            session_id: None,
            cancelled_calls: 0,
            disconnect_acknowledged: false,
            exit_status: None,
        }
    }
}
