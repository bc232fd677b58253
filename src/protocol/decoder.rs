//! Re-buffering frame decoder
//!
//! Network reads do not respect frame boundaries: a single chunk may hold
//! half a frame or three and a half. The decoder accumulates bytes until a
//! delimiter is seen and yields decoded events in arrival order. Anything
//! that reaches a delimiter without decoding as a known variant is a
//! protocol error that terminates the session, never silently dropped.

use super::StreamEvent;
use crate::error::{Error, Result};
use bytes::{Buf, BytesMut};

/// Incremental decoder for newline-delimited event frames
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network chunk, returning every frame completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<StreamEvent>> {
        self.buf.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line = self.buf.split_to(pos + 1);
            let line = &line[..line.len() - 1];
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            events.push(decode_line(line)?);
        }
        Ok(events)
    }

    /// Number of buffered bytes still awaiting a delimiter
    pub fn pending(&self) -> usize {
        self.buf.remaining()
    }

    /// Signal end of stream. Leftover non-whitespace bytes mean the final
    /// frame was cut off, which is a transport-level protocol error.
    pub fn finish(&mut self) -> Result<()> {
        if self.buf.iter().all(u8::is_ascii_whitespace) {
            self.buf.clear();
            return Ok(());
        }
        Err(Error::Protocol(format!(
            "stream ended mid-frame with {} undelivered bytes",
            self.buf.len()
        )))
    }
}

fn decode_line(line: &[u8]) -> Result<StreamEvent> {
    let text = std::str::from_utf8(line)
        .map_err(|e| Error::Protocol(format!("frame is not valid UTF-8: {e}")))?;
    serde_json::from_str::<StreamEvent>(text)
        .map_err(|e| Error::Protocol(format!("undecodable frame {text:?}: {e}")))
}
