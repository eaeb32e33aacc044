//! Adapter writer task.
//!
//! Drains outbound [`Message`]s from a tokio [`mpsc`] channel and writes each
//! one, `Content-Length` framed by [`DapCodec`], to the adapter's input.

use futures_util::SinkExt;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::dap::codec::DapCodec;
use crate::dap::message::Message;
use crate::{AppError, Result};

/// Adapter writer task.
///
/// Exits cleanly when `cancel` fires or every sender of `msg_rx` is dropped.
///
/// # Errors
///
/// Returns [`AppError::Transport`]`("write failed: …")` when a write to the
/// adapter fails, e.g. because the process exited.
pub async fn run_writer<W>(
    session_id: String,
    stdin: W,
    mut msg_rx: mpsc::Receiver<Message>,
    cancel: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut framed = FramedWrite::new(stdin, DapCodec::new());

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(session_id, "dap writer: cancellation received, stopping");
                break;
            }

            msg = msg_rx.recv() => {
                let Some(message) = msg else {
                    debug!(session_id, "dap writer: message channel closed, stopping");
                    break;
                };
                let seq = message.seq();
                framed.send(message).await.map_err(|e| {
                    warn!(session_id, seq, error = %e, "dap writer: write to adapter failed");
                    AppError::Transport(format!("write failed: {e}"))
                })?;
            }
        }
    }

    Ok(())
}
