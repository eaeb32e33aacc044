//! Debug adapter protocol message envelope.
//!
//! Every frame on the wire is one of three shapes, discriminated by the
//! `type` field: a request, a response to a request, or an event.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AppError, Result};

/// One framed protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    /// Command sent by either peer that expects a response.
    Request(Request),
    /// Answer to a previously sent request.
    Response(Response),
    /// Unsolicited notification from the adapter.
    Event(Event),
}

impl Message {
    /// Sequence number of the message itself.
    #[must_use]
    pub fn seq(&self) -> u64 {
        match self {
            Self::Request(req) => req.seq,
            Self::Response(resp) => resp.seq,
            Self::Event(event) => event.seq,
        }
    }
}

/// A protocol request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Sender-assigned sequence number.
    pub seq: u64,
    /// Command name, e.g. `setBreakpoints`.
    pub command: String,
    /// Command-specific arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

/// A protocol response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Sender-assigned sequence number.
    pub seq: u64,
    /// Sequence number of the request being answered.
    pub request_seq: u64,
    /// Whether the request succeeded.
    pub success: bool,
    /// Command of the request being answered.
    pub command: String,
    /// Short error description when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Result payload, or error details when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Response {
    /// Human-readable failure reason reported by the adapter.
    ///
    /// Prefers the formatted error in `body.error.format` over the terse
    /// `message` field.
    #[must_use]
    pub fn failure_message(&self) -> String {
        self.body
            .as_ref()
            .and_then(|body| body.pointer("/error/format"))
            .and_then(Value::as_str)
            .map(str::to_owned)
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| "request failed".to_owned())
    }

    /// Convert into the result payload, mapping `success == false` to
    /// [`AppError::Adapter`].
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Adapter`] carrying the adapter's message when the
    /// request was rejected.
    pub fn into_result(self) -> Result<Value> {
        if self.success {
            Ok(self.body.unwrap_or(Value::Null))
        } else {
            Err(AppError::Adapter {
                message: self.failure_message(),
                command: self.command,
            })
        }
    }
}

/// A protocol event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Sender-assigned sequence number.
    pub seq: u64,
    /// Event name, e.g. `stopped`.
    pub event: String,
    /// Event-specific body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Event {
    /// Integer field from the event body.
    #[must_use]
    pub fn body_i64(&self, field: &str) -> Option<i64> {
        self.body.as_ref()?.get(field)?.as_i64()
    }
}
