//! Adapter reader task: the single inbound dispatch loop.
//!
//! Every decoded frame is parsed and classified by its `type` discriminant:
//!
//! | Kind       | Routed to                                                     |
//! |------------|---------------------------------------------------------------|
//! | `response` | [`DapClient::resolve_response`]; unmatched ones are faults    |
//! | `event`    | [`InboundHandler::on_event`], then the client's event bus      |
//! | `request`  | [`InboundHandler::on_reverse_request`], reply queued to writer |
//!
//! A body that is not a valid message is a protocol fault: it is recorded and
//! skipped. End of stream or a framing error is a transport fault: every
//! pending call fails, the event bus closes and
//! [`InboundHandler::on_disconnect`] runs.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::dap::client::DapClient;
use crate::dap::codec::DapCodec;
use crate::dap::events::ObservedEvent;
use crate::dap::message::{Message, Request};
use crate::dap::reverse::ReverseReply;
use crate::dap::spawner::StderrTail;
use crate::{AppError, Result};

/// Session-side hooks invoked by the reader.
///
/// Hooks run on the reader task. They must not wait for adapter responses,
/// since those can only arrive once the hook returns; work that needs the
/// adapter is spawned onto its own task.
pub trait InboundHandler: Send + Sync {
    /// Update session state for an event before it is published to waiters.
    fn on_event(&self, observed: ObservedEvent) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;

    /// Produce the reply to an adapter-initiated request.
    fn on_reverse_request(
        &self,
        request: Request,
    ) -> Pin<Box<dyn Future<Output = ReverseReply> + Send + '_>>;

    /// Observe the terminal loss of the transport.
    fn on_disconnect(&self, reason: String) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Parse one decoded frame body into a [`Message`].
///
/// # Errors
///
/// Returns [`AppError::Protocol`]`("malformed message: …")` if the body is not
/// JSON or has an unknown `type`.
pub fn parse_frame(body: &[u8]) -> Result<Message> {
    serde_json::from_slice(body).map_err(|e| AppError::Protocol(format!("malformed message: {e}")))
}

/// Adapter reader task.
///
/// Returns when `cancel` fires (without touching the client) or after the
/// transport is lost and the disconnect has been broadcast.
///
/// # Errors
///
/// Never fails; the `Result` mirrors the writer task so both can be joined
/// uniformly.
pub async fn run_reader<R, H>(
    client: DapClient,
    stdout: R,
    handler: Arc<H>,
    stderr_tail: Option<StderrTail>,
    cancel: CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin + Send,
    H: InboundHandler + ?Sized,
{
    let session_id = client.session_id().to_owned();
    let mut framed = FramedRead::new(stdout, DapCodec::new());

    let reason = loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(session_id, "dap reader: cancellation received, stopping");
                return Ok(());
            }

            item = framed.next() => match item {
                None => break "adapter closed its output stream".to_owned(),
                Some(Err(e)) => break format!("unreadable adapter stream: {e}"),
                Some(Ok(body)) => dispatch(&client, handler.as_ref(), &body).await,
            }
        }
    };

    let reason = match stderr_tail {
        Some(tail) => tail.annotate(reason).await,
        None => reason,
    };

    let failed = client.terminate(AppError::Transport(reason.clone())).await;
    warn!(session_id, failed_calls = failed, reason, "dap reader: transport lost");
    handler.on_disconnect(reason).await;

    Ok(())
}

async fn dispatch<H>(client: &DapClient, handler: &H, body: &[u8])
where
    H: InboundHandler + ?Sized,
{
    let message = match parse_frame(body) {
        Ok(message) => message,
        Err(err) => {
            client.record_fault(err.to_string()).await;
            return;
        }
    };

    match message {
        Message::Response(response) => {
            debug!(
                session_id = client.session_id(),
                command = %response.command,
                request_seq = response.request_seq,
                success = response.success,
                "dap response received"
            );
            // Unmatched responses are recorded by the client.
            let _ = client.resolve_response(response).await;
        }
        Message::Event(event) => {
            debug!(session_id = client.session_id(), event = %event.event, "dap event received");
            let observed = client.events().stamp(event);
            handler.on_event(observed.clone()).await;
            client.events().publish_observed(observed);
        }
        Message::Request(request) => {
            debug!(
                session_id = client.session_id(),
                command = %request.command,
                seq = request.seq,
                "dap reverse request received"
            );
            let reply = handler.on_reverse_request(request.clone()).await;
            if let Err(err) = client
                .respond(&request, reply.success, reply.message, reply.body)
                .await
            {
                warn!(session_id = client.session_id(), %err, "failed to answer reverse request");
            }
        }
    }
}
