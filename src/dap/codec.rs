//! `Content-Length` framing codec for debug adapter streams.
//!
//! Each message on the wire is a block of ASCII headers terminated by
//! `\r\n\r\n`, followed by exactly `Content-Length` bytes of UTF-8 JSON.
//!
//! # Usage
//!
//! Use [`DapCodec`] as the codec parameter for
//! [`tokio_util::codec::FramedRead`] (inbound) and
//! [`tokio_util::codec::FramedWrite`] (outbound).  The decoder yields raw
//! JSON bodies so a body that fails to parse can be reported as a protocol
//! fault without tearing the stream down; broken framing is always a
//! transport fault.
//!
//! ```rust,ignore
//! use tokio_util::codec::FramedRead;
//! use agent_debug_bridge::dap::codec::DapCodec;
//!
//! let reader = FramedRead::new(adapter_stdout, DapCodec::new());
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::dap::message::Message;
use crate::{AppError, Result};

/// Maximum size of one header block, terminator included: 8 KiB.
pub const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Maximum accepted body size: 64 MiB.
///
/// Larger declared lengths fail with [`AppError::Transport`] before any
/// allocation for the body happens.
pub const MAX_MESSAGE_BYTES: usize = 64 * 1024 * 1024;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Header-delimited codec for debug adapter streams.
///
/// # Decoder
///
/// Buffers until a complete header block and body are present, then yields
/// the body. Several frames delivered in one read are yielded one per call.
/// Missing or invalid `Content-Length`, oversize headers or bodies, and a
/// stream that ends mid-frame all return [`AppError::Transport`].
///
/// # Encoder
///
/// Serializes a [`Message`] and prefixes it with its `Content-Length`
/// header.
#[derive(Debug, Default)]
pub struct DapCodec {
    /// Body length announced by a header block already consumed.
    pending_body: Option<usize>,
}

impl DapCodec {
    /// Create a codec with no partially decoded frame.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for DapCodec {
    type Item = Bytes;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            if let Some(len) = self.pending_body {
                if src.len() < len {
                    src.reserve(len - src.len());
                    return Ok(None);
                }
                self.pending_body = None;
                return Ok(Some(src.split_to(len).freeze()));
            }

            let Some(end) = find_header_end(src) else {
                if src.len() > MAX_HEADER_BYTES {
                    return Err(AppError::Transport(format!(
                        "header block exceeded {MAX_HEADER_BYTES} bytes without terminator"
                    )));
                }
                return Ok(None);
            };

            if end + HEADER_TERMINATOR.len() > MAX_HEADER_BYTES {
                return Err(AppError::Transport(format!(
                    "header block exceeded {MAX_HEADER_BYTES} bytes"
                )));
            }

            let header = src.split_to(end + HEADER_TERMINATOR.len());
            let len = parse_content_length(&header[..end])?;
            if len > MAX_MESSAGE_BYTES {
                return Err(AppError::Transport(format!(
                    "message of {len} bytes exceeds limit of {MAX_MESSAGE_BYTES} bytes"
                )));
            }
            self.pending_body = Some(len);
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() && self.pending_body.is_none() => Ok(None),
            None => Err(AppError::Transport(format!(
                "stream ended mid-message with {} byte(s) buffered",
                src.len()
            ))),
        }
    }
}

impl Encoder<Message> for DapCodec {
    type Error = AppError;

    /// Encode `item` as a `Content-Length` framed JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Protocol`] if the message cannot be serialized.
    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<()> {
        let body = serde_json::to_vec(&item)
            .map_err(|e| AppError::Protocol(format!("failed to serialize outbound message: {e}")))?;
        let header = format!("Content-Length: {}\r\n\r\n", body.len());
        dst.reserve(header.len() + body.len());
        dst.put_slice(header.as_bytes());
        dst.put_slice(&body);
        Ok(())
    }
}

// ── Private helpers ───────────────────────────────────────────────────────────

fn find_header_end(src: &[u8]) -> Option<usize> {
    src.windows(HEADER_TERMINATOR.len())
        .position(|window| window == HEADER_TERMINATOR)
}

/// Extract the `Content-Length` value from a header block.
///
/// Header names are matched case-insensitively; unknown headers are ignored.
fn parse_content_length(header: &[u8]) -> Result<usize> {
    let text = std::str::from_utf8(header)
        .map_err(|_| AppError::Transport("header block is not valid UTF-8".into()))?;

    for line in text.split("\r\n") {
        let Some((name, value)) = line.split_once(':') else {
            return Err(AppError::Transport(format!("malformed header line: {line:?}")));
        };
        if name.trim().eq_ignore_ascii_case("content-length") {
            return value.trim().parse::<usize>().map_err(|e| {
                AppError::Transport(format!("invalid Content-Length {:?}: {e}", value.trim()))
            });
        }
    }

    Err(AppError::Transport("missing Content-Length header".into()))
}
