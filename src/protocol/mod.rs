//! Wire protocol for streaming sessions
//!
//! Events are framed as newline-delimited JSON over the HTTP response body,
//! one self-delimited object per line with a `type` discriminator. The
//! encoder lives on the server, the re-buffering decoder on the client; both
//! sides share the [`StreamEvent`] variants.

pub mod decoder;


pub use decoder::FrameDecoder;

use crate::error::{Error, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One event traveling server → client.
///
/// Exactly one `Completion` or one `Error` terminates every session, never
/// both. Events are created by the session orchestrator, travel once over the
/// wire, and are consumed exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Raw text fragment, present in hybrid and text modes
    TextChunk { content: String },
    /// Newly completed structured record at `extraction_path[index]`.
    /// Decoded from either an `item` or a legacy `partial` tag.
    #[serde(alias = "partial")]
    Item {
        #[serde(default)]
        index: usize,
        data: Value,
    },
    /// Full authoritative value, emitted exactly once, always last
    Completion { data: Value },
    /// Terminal failure; no further events follow in the session
    Error { code: String, message: String },
}

impl StreamEvent {
    /// Whether this event ends the session
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Completion { .. } | StreamEvent::Error { .. })
    }

    /// Build an `Error` frame from a pipeline error
    pub fn from_error(err: &Error) -> Self {
        StreamEvent::Error {
            code: err.wire_code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Serialize one event as a `\n`-terminated frame.
pub fn encode_frame(event: &StreamEvent) -> Result<Bytes> {
    let mut line = serde_json::to_vec(event)?;
    line.push(b'\n');
    Ok(Bytes::from(line))
}
