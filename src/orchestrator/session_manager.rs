//! The single active debug session and the operations routed to it.
//!
//! At most one session is active. Launching replaces (and shuts down) the
//! previous one. Every operation other than launch and shutdown fails with
//! [`AppError::NoSession`] while nothing is active.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, info_span, Instrument};

use crate::config::GlobalConfig;
use crate::dap::client::ProtocolFault;
use crate::dap::connector::{AdapterConnector, ProcessConnector};
use crate::models::breakpoint::{normalize_lines, BreakpointSet, ExceptionRegistration, RegistrationRecord};
use crate::models::execution::{
    EventWaitResult, ExecutionCommand, ExecutionResult, LocalsReport, SelectedThread,
};
use crate::models::launch::{LaunchReport, LaunchRequest};
use crate::models::session::{LaunchPhase, ShutdownReport};
use crate::models::stopped::StoppedEventCache;
use crate::orchestrator::execution;
use crate::orchestrator::launcher;
use crate::orchestrator::registrar::Registrar;
use crate::orchestrator::session::Session;
use crate::paths::resolve_target;
use crate::{AppError, Result};

/// Breakpoint audit of the active session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointListing {
    /// Session the listing belongs to.
    pub session_id: String,
    /// Requested breakpoints per source.
    pub breakpoints: BreakpointSet,
    /// Registration audit per source.
    pub registrations: Vec<RegistrationRecord>,
    /// Exception filter registration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception_breakpoints: Option<ExceptionRegistration>,
}

/// Stop context of the active session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopSnapshot {
    /// Session the snapshot belongs to.
    pub session_id: String,
    /// Lifecycle phase.
    pub phase: LaunchPhase,
    /// Number of stops so far.
    pub stop_count: u64,
    /// Most recent stop, if any.
    pub stopped_event: Option<StoppedEventCache>,
    /// Thread of the latest execution or inspection command.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_thread: Option<SelectedThread>,
    /// Recently recorded protocol faults.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub protocol_faults: Vec<ProtocolFault>,
}

/// Owner of the active session.
pub struct SessionManager {
    config: Arc<GlobalConfig>,
    connector: Arc<dyn AdapterConnector>,
    active: Mutex<Option<Arc<Session>>>,
    last_shutdown: Mutex<Option<ShutdownReport>>,
    launch_lock: Mutex<()>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("project_root", &self.config.project_root())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Manager connecting adapters through `connector`.
    #[must_use]
    pub fn new(config: Arc<GlobalConfig>, connector: Arc<dyn AdapterConnector>) -> Self {
        Self {
            config,
            connector,
            active: Mutex::new(None),
            last_shutdown: Mutex::new(None),
            launch_lock: Mutex::new(()),
        }
    }

    /// Manager spawning the configured adapter subprocess.
    #[must_use]
    pub fn with_process_connector(config: Arc<GlobalConfig>) -> Self {
        let connector = Arc::new(ProcessConnector::from_config(&config));
        Self::new(config, connector)
    }

    /// Global settings.
    #[must_use]
    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    /// The active session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NoSession` when nothing is active.
    pub async fn active(&self) -> Result<Arc<Session>> {
        self.active.lock().await.clone().ok_or(AppError::NoSession)
    }

    /// Launch a new session, shutting down any active one first.
    ///
    /// # Errors
    ///
    /// Propagates launch failures. The previous session is gone either way.
    pub async fn launch(&self, request: LaunchRequest) -> Result<LaunchReport> {
        let _serialized = self.launch_lock.lock().await;

        let previous = self.active.lock().await.take();
        if let Some(previous) = previous {
            info!(session_id = previous.id(), "replacing active session");
            let report = previous.shutdown().await;
            *self.last_shutdown.lock().await = Some(report);
        }

        let (session, report) =
            launcher::launch(Arc::clone(&self.config), self.connector.as_ref(), request).await?;
        *self.active.lock().await = Some(session);
        Ok(report)
    }

    /// Set breakpoints for one source on the active session.
    ///
    /// Relative sources resolve like launch targets, with the session's
    /// working directory as the last base. An empty line list clears the
    /// source.
    ///
    /// # Errors
    ///
    /// `AppError::NoSession`, `AppError::TargetNotFound`,
    /// `AppError::InvalidInput` for line `0`, and transport faults.
    pub async fn set_breakpoints(&self, source: &str, lines: &[u32]) -> Result<RegistrationRecord> {
        let session = self.active().await?;
        let shared = session.shared();
        shared.ensure_active().await?;

        let cwd: Option<PathBuf> = shared.state.read().await.cwd.clone();
        let path = resolve_target(source, self.config.project_root(), cwd.as_deref())?;
        let lines = normalize_lines(lines)?;

        let span = info_span!("set_breakpoints", session_id = session.id(), source = %path.display());
        Registrar::new(shared)
            .register_manual(&path, lines)
            .instrument(span)
            .await
    }

    /// Breakpoint audit of the active session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NoSession` when nothing is active.
    pub async fn list_breakpoints(&self) -> Result<BreakpointListing> {
        let session = self.active().await?;
        let state = session.shared().state.read().await;
        Ok(BreakpointListing {
            session_id: session.id().to_owned(),
            breakpoints: state.breakpoints.clone(),
            registrations: state.registrations.values().cloned().collect(),
            exception_breakpoints: state.exception_breakpoints.clone(),
        })
    }

    /// Issue an execution-control command.
    ///
    /// # Errors
    ///
    /// `AppError::NoSession` plus the errors of [`execution::execute`].
    pub async fn execute(&self, command: ExecutionCommand, thread: Option<i64>) -> Result<ExecutionResult> {
        let session = self.active().await?;
        execution::execute(session.shared(), command, thread).await
    }

    /// Locals of the innermost frame.
    ///
    /// # Errors
    ///
    /// `AppError::NoSession` plus the errors of [`execution::locals`].
    pub async fn locals(&self, thread: Option<i64>) -> Result<LocalsReport> {
        let session = self.active().await?;
        execution::locals(session.shared(), thread).await
    }

    /// Cached stop context.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NoSession` when nothing is active.
    pub async fn last_stopped_event(&self) -> Result<StopSnapshot> {
        let session = self.active().await?;
        let protocol_faults = session.client().recent_faults().await;
        let state = session.shared().state.read().await;
        Ok(StopSnapshot {
            session_id: session.id().to_owned(),
            phase: state.phase.clone(),
            stop_count: state.stop_count,
            stopped_event: state.last_stop.clone(),
            last_thread: state.last_thread,
            protocol_faults,
        })
    }

    /// Wait for the next unconsumed event called `name`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NoSession` when nothing is active. Timeouts are
    /// reported in the result.
    pub async fn wait_for_event(&self, name: &str, timeout: Duration) -> Result<EventWaitResult> {
        let session = self.active().await?;
        Ok(execution::wait_for_event(session.shared(), name, timeout).await)
    }

    /// Shut down the active session.
    ///
    /// Repeated calls return the report of the session shut down last, or a
    /// `no-session` report if there never was one.
    pub async fn shutdown(&self) -> ShutdownReport {
        let active = self.active.lock().await.take();
        match active {
            Some(session) => {
                let report = session.shutdown().await;
                *self.last_shutdown.lock().await = Some(report.clone());
                report
            }
            None => self
                .last_shutdown
                .lock()
                .await
                .clone()
                .unwrap_or_else(ShutdownReport::no_session),
        }
    }
}
