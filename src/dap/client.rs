//! Correlation engine: sequence numbering, request/response matching and
//! event publication for one adapter connection.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::dap::events::EventBus;
use crate::dap::message::{Event, Message, Request, Response};
use crate::dap::pending::{PendingCalls, ResponseSlot};
use crate::{AppError, Result};

/// Number of protocol faults kept for inspection.
pub const MAX_RECORDED_FAULTS: usize = 32;

/// A protocol violation observed on an otherwise healthy stream.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolFault {
    /// When the fault was observed.
    pub at: DateTime<Utc>,
    /// Description of the violation.
    pub message: String,
}

struct ClientInner {
    session_id: String,
    next_seq: AtomicU64,
    pending: PendingCalls,
    events: EventBus,
    outbound: mpsc::Sender<Message>,
    faults: Mutex<VecDeque<ProtocolFault>>,
    request_timeout: Duration,
}

/// Handle to one adapter connection's correlation engine.
///
/// Cheap to clone; all clones share one sequence counter, one pending-call
/// table and one event bus.
#[derive(Clone)]
pub struct DapClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for DapClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DapClient")
            .field("session_id", &self.inner.session_id)
            .finish_non_exhaustive()
    }
}

/// A request already written to the adapter whose response is awaited later.
#[derive(Debug)]
pub struct PendingResponse {
    seq: u64,
    command: String,
    slot: ResponseSlot,
    client: DapClient,
}

impl PendingResponse {
    /// Sequence number of the request.
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Await the raw response within the client's request timeout.
    ///
    /// # Errors
    ///
    /// - [`AppError::Timeout`] when no response arrives in time.
    /// - The terminal transport error if the connection broke.
    /// - [`AppError::SessionClosed`] if the slot vanished.
    pub async fn wait(self) -> Result<Response> {
        let timeout = self.client.inner.request_timeout;
        match tokio::time::timeout(timeout, self.slot).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_dropped)) => Err(AppError::SessionClosed(format!(
                "'{}' was abandoned before a response arrived",
                self.command
            ))),
            Err(_elapsed) => {
                self.client.inner.pending.cancel(self.seq).await;
                warn!(
                    session_id = %self.client.inner.session_id,
                    command = %self.command,
                    seq = self.seq,
                    "dap request timed out"
                );
                Err(AppError::Timeout(format!(
                    "'{}' (seq {}) got no response within {timeout:?}",
                    self.command, self.seq
                )))
            }
        }
    }

    /// Await the response and unwrap its body.
    ///
    /// # Errors
    ///
    /// As [`wait`](Self::wait), plus [`AppError::Adapter`] on rejection.
    pub async fn result(self) -> Result<Value> {
        self.wait().await?.into_result()
    }
}

impl DapClient {
    /// Create a client that writes outbound messages into `outbound`.
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        outbound: mpsc::Sender<Message>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                session_id: session_id.into(),
                next_seq: AtomicU64::new(1),
                pending: PendingCalls::new(),
                events: EventBus::new(),
                outbound,
                faults: Mutex::new(VecDeque::new()),
                request_timeout,
            }),
        }
    }

    /// Session this connection belongs to.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    /// Event bus fed by the inbound reader.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    fn next_seq(&self) -> u64 {
        self.inner.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Write a request and return a handle to its future response.
    ///
    /// # Errors
    ///
    /// - The terminal error if the connection already failed.
    /// - [`AppError::Transport`] if the writer task is gone.
    pub async fn start_request(
        &self,
        command: &str,
        arguments: Option<Value>,
    ) -> Result<PendingResponse> {
        let seq = self.next_seq();
        let slot = self.inner.pending.register(seq).await?;

        let message = Message::Request(Request {
            seq,
            command: command.to_owned(),
            arguments,
        });

        if self.inner.outbound.send(message).await.is_err() {
            self.inner.pending.cancel(seq).await;
            return Err(AppError::Transport(format!(
                "adapter writer closed before '{command}' could be sent"
            )));
        }

        debug!(session_id = %self.inner.session_id, command, seq, "dap request sent");

        Ok(PendingResponse {
            seq,
            command: command.to_owned(),
            slot,
            client: self.clone(),
        })
    }

    /// Send a request and await its raw response, successful or not.
    ///
    /// # Errors
    ///
    /// Transport, timeout and closure errors; adapter rejections are returned
    /// as a response with `success == false`.
    pub async fn send_request(&self, command: &str, arguments: Option<Value>) -> Result<Response> {
        self.start_request(command, arguments).await?.wait().await
    }

    /// Send a request and return its body.
    ///
    /// # Errors
    ///
    /// As [`send_request`](Self::send_request), plus [`AppError::Adapter`]
    /// when the adapter rejects the command.
    pub async fn call(&self, command: &str, arguments: Option<Value>) -> Result<Value> {
        self.send_request(command, arguments).await?.into_result()
    }

    /// Answer an adapter-initiated request.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Transport`] if the writer task is gone.
    pub async fn respond(
        &self,
        request: &Request,
        success: bool,
        message: Option<String>,
        body: Option<Value>,
    ) -> Result<()> {
        let response = Message::Response(Response {
            seq: self.next_seq(),
            request_seq: request.seq,
            success,
            command: request.command.clone(),
            message,
            body,
        });
        self.inner.outbound.send(response).await.map_err(|_| {
            AppError::Transport(format!(
                "adapter writer closed before reply to '{}' could be sent",
                request.command
            ))
        })
    }

    /// Route an inbound response to its pending call.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Protocol`] for an unmatched response; the fault is
    /// also recorded for later inspection.
    pub async fn resolve_response(&self, response: Response) -> Result<()> {
        match self.inner.pending.resolve(response).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.record_fault(err.to_string()).await;
                Err(err)
            }
        }
    }

    /// Publish an inbound event to the bus.
    pub fn publish_event(&self, event: Event) -> u64 {
        self.inner.events.publish(event)
    }

    /// Remember a protocol fault, discarding the oldest beyond
    /// [`MAX_RECORDED_FAULTS`].
    pub async fn record_fault(&self, message: impl Into<String>) {
        let message = message.into();
        warn!(session_id = %self.inner.session_id, fault = %message, "dap protocol fault");
        let mut faults = self.inner.faults.lock().await;
        if faults.len() == MAX_RECORDED_FAULTS {
            faults.pop_front();
        }
        faults.push_back(ProtocolFault {
            at: Utc::now(),
            message,
        });
    }

    /// Protocol faults observed so far, oldest first.
    pub async fn recent_faults(&self) -> Vec<ProtocolFault> {
        self.inner.faults.lock().await.iter().cloned().collect()
    }

    /// Number of requests awaiting a response.
    pub async fn pending_count(&self) -> usize {
        self.inner.pending.len().await
    }

    /// Fail every pending call with `err`, refuse new requests and close the
    /// event bus.
    ///
    /// Returns the number of calls that were failed.
    pub async fn terminate(&self, err: AppError) -> usize {
        self.inner.events.close(err.to_string());
        self.inner.pending.fail_all(err).await
    }
}
