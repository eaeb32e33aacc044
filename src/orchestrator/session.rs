//! One debug session: adapter link, transport tasks, and shared state.
//!
//! A [`Session`] owns the reader and writer tasks and the adapter process.
//! Everything the reader mutates lives in [`SessionShared`] behind a single
//! lock, which is never held across an adapter round-trip.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde_json::json;
use tokio::sync::{mpsc, Mutex, OnceCell, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::GlobalConfig;
use crate::dap::client::DapClient;
use crate::dap::connector::AdapterConnector;
use crate::dap::events::ObservedEvent;
use crate::dap::message::Request;
use crate::dap::reader::{run_reader, InboundHandler};
use crate::dap::reverse::{answer_reverse_request, ReverseReply};
use crate::dap::spawner::AdapterProcess;
use crate::dap::writer::run_writer;
use crate::models::breakpoint::{BreakpointSet, ExceptionRegistration, RegistrationRecord};
use crate::models::execution::SelectedThread;
use crate::models::session::{LaunchPhase, ShutdownReport, ShutdownStatus};
use crate::models::stopped::StoppedEventCache;
use crate::orchestrator::registrar::Registrar;
use crate::{AppError, Result};

/// Capacity of the outbound message queue.
const OUTBOUND_QUEUE: usize = 64;

/// Bound on joining a transport task after cancellation.
const TASK_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Progress of the one-off module re-registration after the first stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostStopRetry {
    /// Not yet run; the first stop will trigger it.
    Pending,
    /// The launch sequence is waiting for the first stop and will run it.
    ClaimedByLaunch,
    /// Running in the background.
    Running,
    /// Finished; never runs again in this session.
    Done,
}

/// Mutable state of a session.
#[derive(Debug)]
pub struct SessionState {
    /// Lifecycle phase.
    pub phase: LaunchPhase,
    /// Resolved program path.
    pub program: Option<PathBuf>,
    /// Debuggee working directory.
    pub cwd: Option<PathBuf>,
    /// Requested breakpoints.
    pub breakpoints: BreakpointSet,
    /// Registration audit keyed by source.
    pub registrations: BTreeMap<PathBuf, RegistrationRecord>,
    /// Exception filter registration, when filters are configured.
    pub exception_breakpoints: Option<ExceptionRegistration>,
    /// Most recent stop.
    pub last_stop: Option<StoppedEventCache>,
    /// Number of stops observed.
    pub stop_count: u64,
    /// Thread used by the most recent execution or inspection command.
    pub last_thread: Option<SelectedThread>,
    /// Whether the adapter has sent `initialized`.
    pub initialized: bool,
    /// Post-first-stop retry progress.
    pub post_stop_retry: PostStopRetry,
    /// Per event name, the newest generation a caller has consumed.
    pub wait_cursors: HashMap<String, u64>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            phase: LaunchPhase::Idle,
            program: None,
            cwd: None,
            breakpoints: BreakpointSet::new(),
            registrations: BTreeMap::new(),
            exception_breakpoints: None,
            last_stop: None,
            stop_count: 0,
            last_thread: None,
            initialized: false,
            post_stop_retry: PostStopRetry::Pending,
            wait_cursors: HashMap::new(),
        }
    }
}

impl SessionState {
    /// Move to `phase` unless the session has already ended.
    pub fn advance(&mut self, phase: LaunchPhase) {
        if !self.phase.is_terminal() {
            self.phase = phase;
        }
    }

    /// Cursor for `name`, zero when never consumed.
    #[must_use]
    pub fn cursor(&self, name: &str) -> u64 {
        self.wait_cursors.get(name).copied().unwrap_or(0)
    }

    /// Raise the cursor for `name` to `generation`.
    pub fn consume(&mut self, name: &str, generation: u64) {
        let cursor = self.wait_cursors.entry(name.to_owned()).or_insert(0);
        *cursor = (*cursor).max(generation);
    }
}

/// State shared between a session's owner and its reader task.
#[derive(Debug)]
pub struct SessionShared {
    /// Protocol client.
    pub client: DapClient,
    /// Global settings.
    pub config: Arc<GlobalConfig>,
    /// Session state.
    pub state: RwLock<SessionState>,
    this: Weak<SessionShared>,
}

impl SessionShared {
    /// Session identifier.
    #[must_use]
    pub fn session_id(&self) -> &str {
        self.client.session_id()
    }

    /// Fail with `SessionClosed` once the session has ended.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SessionClosed` carrying the abort reason.
    pub async fn ensure_active(&self) -> Result<()> {
        match &self.state.read().await.phase {
            LaunchPhase::Aborted { reason } => Err(AppError::SessionClosed(reason.clone())),
            LaunchPhase::Closed => Err(AppError::SessionClosed("session was shut down".into())),
            _ => Ok(()),
        }
    }

    /// Mark the session aborted unless it already ended.
    pub async fn abort(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let mut state = self.state.write().await;
        if !state.phase.is_terminal() {
            warn!(session_id = self.session_id(), reason, "session aborted");
            state.phase = LaunchPhase::Aborted { reason };
        }
    }

    async fn record_stop(&self, observed: &ObservedEvent) {
        let spawn_retry = {
            let mut state = self.state.write().await;
            state.stop_count += 1;
            let stop = StoppedEventCache::capture(
                state.stop_count,
                observed,
                state.breakpoints.clone(),
            );
            info!(
                session_id = self.session_id(),
                stop_number = stop.stop_number,
                reason = %stop.body.reason,
                thread_id = ?stop.thread_id(),
                "debuggee stopped"
            );
            state.last_stop = Some(stop);

            let first = state.stop_count == 1;
            if first && state.post_stop_retry == PostStopRetry::Pending && !state.phase.is_terminal() {
                state.post_stop_retry = PostStopRetry::Running;
                true
            } else {
                false
            }
        };

        if spawn_retry {
            let Some(shared) = self.this.upgrade() else {
                return;
            };
            let span = info_span!("post_stop_retry", session_id = self.session_id());
            tokio::spawn(
                async move {
                    if let Err(err) = Registrar::new(shared.as_ref()).retry_after_first_stop().await {
                        warn!(%err, "post-stop breakpoint retry failed");
                    }
                    shared.state.write().await.post_stop_retry = PostStopRetry::Done;
                }
                .instrument(span),
            );
        }
    }
}

impl InboundHandler for SessionShared {
    fn on_event(
        &self,
        observed: ObservedEvent,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            match observed.event.event.as_str() {
                "stopped" => self.record_stop(&observed).await,
                "initialized" => {
                    self.state.write().await.initialized = true;
                    debug!(session_id = self.session_id(), "adapter initialized");
                }
                "terminated" | "exited" => {
                    info!(
                        session_id = self.session_id(),
                        event = %observed.event.event,
                        exit_code = ?observed.event.body_i64("exitCode"),
                        "debuggee finished"
                    );
                }
                _ => {}
            }
        })
    }

    fn on_reverse_request(
        &self,
        request: Request,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ReverseReply> + Send + '_>> {
        Box::pin(async move { answer_reverse_request(self.session_id(), &request) })
    }

    fn on_disconnect(
        &self,
        reason: String,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + '_>> {
        Box::pin(async move { self.abort(reason).await })
    }
}

/// A live debug session.
pub struct Session {
    shared: Arc<SessionShared>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    process: Mutex<Option<AdapterProcess>>,
    shutdown: OnceCell<ShutdownReport>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Connect an adapter and start the transport tasks.
    ///
    /// # Errors
    ///
    /// Propagates the connector's error, typically `AppError::Transport`.
    pub async fn start(
        config: Arc<GlobalConfig>,
        connector: &dyn AdapterConnector,
    ) -> Result<Arc<Self>> {
        let session_id = Uuid::new_v4().to_string();
        let link = connector.connect(&session_id).await?;

        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);
        let client = DapClient::new(session_id.clone(), outbound_tx, config.timeouts.request());
        let shared = Arc::new_cyclic(|this| SessionShared {
            client: client.clone(),
            config: Arc::clone(&config),
            state: RwLock::new(SessionState::default()),
            this: this.clone(),
        });

        let cancel = CancellationToken::new();
        let stderr_tail = link.process.as_ref().map(|p| p.stderr_tail.clone());

        let writer = {
            let client = client.clone();
            let shared = Arc::clone(&shared);
            let cancel = cancel.clone();
            let writer_stream = link.writer;
            tokio::spawn(async move {
                if let Err(err) =
                    run_writer(client.session_id().to_owned(), writer_stream, outbound_rx, cancel)
                        .await
                {
                    let reason = err.to_string();
                    client.terminate(err).await;
                    shared.abort(reason).await;
                }
            })
        };

        let reader = {
            let handler = Arc::clone(&shared);
            let cancel = cancel.clone();
            let reader_stream = link.reader;
            tokio::spawn(async move {
                if let Err(err) = run_reader(client, reader_stream, handler, stderr_tail, cancel).await {
                    warn!(%err, "dap reader exited with error");
                }
            })
        };

        info!(session_id, "debug session started");

        Ok(Arc::new(Self {
            shared,
            cancel,
            tasks: Mutex::new(vec![reader, writer]),
            process: Mutex::new(link.process),
            shutdown: OnceCell::new(),
        }))
    }

    /// Session identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        self.shared.session_id()
    }

    /// Protocol client.
    #[must_use]
    pub fn client(&self) -> &DapClient {
        &self.shared.client
    }

    /// Shared state.
    #[must_use]
    pub fn shared(&self) -> &Arc<SessionShared> {
        &self.shared
    }

    /// Current lifecycle phase.
    pub async fn phase(&self) -> LaunchPhase {
        self.shared.state.read().await.phase.clone()
    }

    /// Abort the session and release its resources.
    pub async fn abort(&self, reason: impl Into<String>) -> ShutdownReport {
        self.shared.abort(reason).await;
        self.shutdown().await
    }

    /// Tear the session down. Idempotent: later calls return the first report.
    pub async fn shutdown(&self) -> ShutdownReport {
        self.shutdown
            .get_or_init(|| self.shutdown_once())
            .await
            .clone()
    }

    async fn shutdown_once(&self) -> ShutdownReport {
        let session_id = self.id().to_owned();
        let client = self.client();
        let timeouts = &self.shared.config.timeouts;

        let mut disconnect_acknowledged = false;
        if client.events().closed_reason().is_none() {
            let request = client.send_request(
                "disconnect",
                Some(json!({ "restart": false, "terminateDebuggee": true })),
            );
            match tokio::time::timeout(timeouts.disconnect(), request).await {
                Ok(Ok(response)) => disconnect_acknowledged = response.success,
                Ok(Err(err)) => debug!(session_id, %err, "disconnect not acknowledged"),
                Err(_elapsed) => debug!(session_id, "disconnect timed out"),
            }
        }

        let cancelled_calls = client
            .terminate(AppError::SessionClosed("session was shut down".into()))
            .await;

        self.cancel.cancel();
        for task in self.tasks.lock().await.drain(..) {
            let abort = task.abort_handle();
            if tokio::time::timeout(TASK_JOIN_TIMEOUT, task).await.is_err() {
                abort.abort();
            }
        }

        let exit_status = match self.process.lock().await.take() {
            Some(mut process) => process
                .terminate(&session_id, timeouts.shutdown_grace())
                .await
                .map(|status| status.to_string()),
            None => None,
        };

        self.shared.state.write().await.advance(LaunchPhase::Closed);
        info!(session_id, cancelled_calls, disconnect_acknowledged, "debug session shut down");

        ShutdownReport {
            status: ShutdownStatus::Stopped,
            session_id: Some(session_id),
            cancelled_calls,
            disconnect_acknowledged,
            exit_status,
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
