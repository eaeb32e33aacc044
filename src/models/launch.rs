//! Launch request and report.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::HandshakeOrder;
use crate::models::breakpoint::{ExceptionRegistration, RegistrationRecord};
use crate::models::session::LaunchPhase;
use crate::models::stopped::StoppedEventCache;
use crate::{AppError, Result};

fn default_true() -> bool {
    true
}

/// Arguments of a launch.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct LaunchRequest {
    /// Program to debug, absolute or relative.
    pub program: String,
    /// Debuggee working directory; defaults to the program's directory.
    #[serde(default)]
    pub cwd: Option<String>,
    /// Breakpoint lines in the program.
    #[serde(default)]
    pub breakpoints: Vec<u32>,
    /// Breakpoint lines in additional module sources.
    #[serde(default)]
    pub breakpoints_by_source: BTreeMap<String, Vec<u32>>,
    /// Ask the adapter to pause before the first line runs.
    #[serde(default)]
    pub stop_on_entry: bool,
    /// Wait for the first stop before returning.
    #[serde(default = "default_true")]
    pub wait_for_breakpoint: bool,
    /// Bound on that wait, in seconds.
    #[serde(default)]
    pub breakpoint_timeout: Option<f64>,
    /// Extra environment variables for the debuggee.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl LaunchRequest {
    /// Request for `program` with defaults everywhere else.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            cwd: None,
            breakpoints: Vec::new(),
            breakpoints_by_source: BTreeMap::new(),
            stop_on_entry: false,
            wait_for_breakpoint: true,
            breakpoint_timeout: None,
            env: BTreeMap::new(),
        }
    }

    /// Whether any breakpoint was requested.
    #[must_use]
    pub fn has_breakpoints(&self) -> bool {
        !self.breakpoints.is_empty() || self.breakpoints_by_source.values().any(|l| !l.is_empty())
    }

    /// Stop-wait bound, falling back to `default`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidInput` for a negative or non-finite bound.
    pub fn stop_timeout(&self, default: Duration) -> Result<Duration> {
        match self.breakpoint_timeout {
            None => Ok(default),
            Some(secs) => seconds(secs, "breakpoint_timeout"),
        }
    }
}

/// Convert caller-supplied seconds into a [`Duration`].
///
/// # Errors
///
/// Returns `AppError::InvalidInput` for negative, NaN or infinite values.
pub fn seconds(secs: f64, field: &str) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|_| AppError::InvalidInput(format!("{field} must be a non-negative number of seconds")))
}

/// What happened while waiting for the first stop.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StopOutcome {
    /// The debuggee paused.
    Stopped {
        /// Cached stop.
        stop: Box<StoppedEventCache>,
    },
    /// The bound elapsed without a stop.
    TimedOut {
        /// Bound that applied.
        timeout_seconds: f64,
    },
    /// No wait was performed.
    Skipped {
        /// Why.
        reason: String,
    },
    /// The transport closed during the wait.
    Disconnected {
        /// Transport loss reason.
        reason: String,
    },
}

/// Everything a launch did, phase by phase.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchReport {
    /// New session.
    pub session_id: String,
    /// Resolved program.
    pub program: PathBuf,
    /// Resolved debuggee working directory.
    pub cwd: PathBuf,
    /// Handshake order used.
    pub handshake: HandshakeOrder,
    /// Session phase when the launch returned.
    pub phase: LaunchPhase,
    /// Whether `initialized` arrived before `configurationDone` was sent.
    pub initialized_early: bool,
    /// Whether `initialized` arrived at all within its bound.
    pub initialized_observed: bool,
    /// Whether stop-on-entry was requested.
    pub stop_on_entry_requested: bool,
    /// Adapter capabilities from `initialize`.
    pub capabilities: Value,
    /// Body of the `launch` response.
    pub launch: Value,
    /// Registration audit per source after every phase that ran.
    pub registrations: Vec<RegistrationRecord>,
    /// Exception breakpoint registration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception_breakpoints: Option<ExceptionRegistration>,
    /// Outcome of the first-stop wait.
    pub stop: StopOutcome,
    /// Non-fatal problems met along the way.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}
