//! Correlation table of outstanding requests.

use std::collections::HashMap;

use tokio::sync::{oneshot, Mutex};

use crate::dap::message::Response;
use crate::{AppError, Result};

/// Completion slot of one outstanding request.
pub type ResponseSlot = oneshot::Receiver<Result<Response>>;

#[derive(Debug, Default)]
struct Table {
    calls: HashMap<u64, oneshot::Sender<Result<Response>>>,
    closed: Option<AppError>,
}

/// Map from request sequence number to its single-use completion slot.
///
/// A slot is resolved exactly once: by the matching response, by
/// [`fail_all`](Self::fail_all), or by being dropped via
/// [`cancel`](Self::cancel) when the caller gives up.
#[derive(Debug, Default)]
pub struct PendingCalls {
    table: Mutex<Table>,
}

impl PendingCalls {
    /// Create an empty, open table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a slot for `seq`.
    ///
    /// # Errors
    ///
    /// - The stored terminal error once [`fail_all`](Self::fail_all) has run.
    /// - [`AppError::Protocol`] if `seq` is already outstanding.
    pub async fn register(&self, seq: u64) -> Result<ResponseSlot> {
        let mut table = self.table.lock().await;
        if let Some(err) = &table.closed {
            return Err(err.clone());
        }
        if table.calls.contains_key(&seq) {
            return Err(AppError::Protocol(format!(
                "sequence number {seq} is already outstanding"
            )));
        }
        let (tx, rx) = oneshot::channel();
        table.calls.insert(seq, tx);
        Ok(rx)
    }

    /// Resolve the slot matching `response.request_seq`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Protocol`] when no request with that sequence
    /// number is outstanding.
    pub async fn resolve(&self, response: Response) -> Result<()> {
        let slot = self.table.lock().await.calls.remove(&response.request_seq);
        match slot {
            Some(tx) => {
                // The caller may have timed out and dropped its receiver.
                let _ = tx.send(Ok(response));
                Ok(())
            }
            None => Err(AppError::Protocol(format!(
                "unmatched response to '{}' (request_seq {})",
                response.command, response.request_seq
            ))),
        }
    }

    /// Drop the slot for `seq` without resolving it.
    pub async fn cancel(&self, seq: u64) {
        self.table.lock().await.calls.remove(&seq);
    }

    /// Fail every outstanding slot with `err` and refuse new registrations.
    ///
    /// Returns the number of slots that were failed. Subsequent calls keep the
    /// first error and fail nothing.
    pub async fn fail_all(&self, err: AppError) -> usize {
        let mut table = self.table.lock().await;
        if table.closed.is_none() {
            table.closed = Some(err.clone());
        }
        let drained: Vec<_> = table.calls.drain().collect();
        drop(table);

        let count = drained.len();
        for (_, tx) in drained {
            let _ = tx.send(Err(err.clone()));
        }
        count
    }

    /// Number of outstanding requests.
    pub async fn len(&self) -> usize {
        self.table.lock().await.calls.len()
    }

    /// Whether no request is outstanding.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
