//! Session orchestrator: one streaming request, end to end
//!
//! Each session owns its raw buffer and extraction cursor, pulls token
//! batches from an exclusively-owned upstream stream, and emits wire events
//! into a bounded channel. The channel bound doubles as backpressure: when
//! the transport cannot drain, the orchestrator suspends instead of pulling
//! further upstream tokens. A failed send means the client went away, at
//! which point the session stops and drops the upstream stream.

#[cfg(test)]
mod tests;

use crate::error::{Error, Result};
use crate::extract::{self, ExtractionCursor, ExtractionPath, ItemPredicate};
use crate::mode::StreamingMode;
use crate::producer::{backoff_delay_ms, is_retryable, TokenStream, UpstreamProducer};
use crate::protocol::StreamEvent;
use futures_util::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Per-session settings resolved from config, prompt spec, and request
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub mode: StreamingMode,
    pub extraction_path: ExtractionPath,
    pub predicate: ItemPredicate,
    pub idle_timeout: Duration,
    pub max_connect_retries: u32,
    pub retry_delay_ms: u64,
}

/// One streaming session. Owns the buffer and cursor for its lifetime;
/// nothing is shared across sessions.
pub struct StreamSession {
    id: Uuid,
    config: SessionConfig,
    buffer: String,
    cursor: ExtractionCursor,
    mode: StreamingMode,
    /// Buffer prefix already sent out as text chunks
    text_sent: usize,
}

impl StreamSession {
    pub fn new(config: SessionConfig) -> Self {
        let mode = config.mode;
        Self {
            id: Uuid::new_v4(),
            config,
            buffer: String::new(),
            cursor: ExtractionCursor::new(),
            mode,
            text_sent: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Drive the session to its terminal event.
    ///
    /// Emits exactly one `Completion` or one `Error` frame unless the client
    /// disconnects first, in which case nothing further is emitted at all.
    pub async fn run(
        mut self,
        producer: Arc<dyn UpstreamProducer>,
        payload: Value,
        tx: mpsc::Sender<StreamEvent>,
    ) {
        info!("session {} started (mode {})", self.id, self.mode);

        let mut stream = match self.open_with_retry(producer.as_ref(), &payload).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("session {} failed to open upstream: {}", self.id, e);
                let _ = tx.send(StreamEvent::from_error(&e)).await;
                return;
            }
        };

        loop {
            let next = timeout(self.config.idle_timeout, stream.next()).await;
            let batch = match next {
                Ok(batch) => batch,
                Err(_) => {
                    let e = Error::Timeout(format!(
                        "no upstream tokens within {:?}",
                        self.config.idle_timeout
                    ));
                    warn!("session {}: {}", self.id, e);
                    let _ = tx.send(StreamEvent::from_error(&e)).await;
                    return;
                }
            };

            match batch {
                Some(Ok(tokens)) => {
                    if tx.is_closed() || !self.ingest(&tokens, &tx).await {
                        debug!("session {} client went away, releasing upstream", self.id);
                        return;
                    }
                }
                Some(Err(e)) => {
                    warn!("session {} upstream failed mid-stream: {}", self.id, e);
                    let _ = tx.send(StreamEvent::from_error(&e)).await;
                    return;
                }
                None => break,
            }
        }
        drop(stream);

        let buffered = self.buffer.len();
        let terminal = self.finalize();
        if tx.send(terminal).await.is_err() {
            debug!("session {} client went away before terminal frame", self.id);
            return;
        }
        info!("session {} complete ({} bytes buffered)", self.id, buffered);
    }

    /// Bounded-retry upstream open. Only runs before anything has been
    /// emitted downstream; once streaming begins, failures are terminal.
    async fn open_with_retry(
        &self,
        producer: &dyn UpstreamProducer,
        payload: &Value,
    ) -> Result<TokenStream> {
        let mut attempt = 0;
        loop {
            match producer.open(payload).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    attempt += 1;
                    if attempt > self.config.max_connect_retries || !is_retryable(&e) {
                        return Err(e);
                    }
                    let delay = backoff_delay_ms(self.config.retry_delay_ms, attempt);
                    debug!(
                        "session {} open attempt {} failed ({}), retrying in {}ms",
                        self.id, attempt, e, delay
                    );
                    sleep(Duration::from_millis(delay)).await;
                }
            }
        }
    }

    /// Append one token batch and emit whatever it completes.
    ///
    /// Returns false when the downstream transport is gone.
    async fn ingest(&mut self, tokens: &str, tx: &mpsc::Sender<StreamEvent>) -> bool {
        self.buffer.push_str(tokens);

        if self.mode.is_auto() {
            match StreamingMode::detect(&self.buffer) {
                Some(resolved) => {
                    debug!("session {} auto mode resolved to {}", self.id, resolved);
                    self.mode = resolved;
                }
                // Not enough signal yet; hold events until the mode is known.
                None => return true,
            }
        }

        if self.mode.emits_text() && self.buffer.len() > self.text_sent {
            let content = self.buffer[self.text_sent..].to_string();
            self.text_sent = self.buffer.len();
            if tx.send(StreamEvent::TextChunk { content }).await.is_err() {
                return false;
            }
        }

        if self.mode.emits_items() {
            let pass = extract::extract(
                &self.buffer,
                &self.config.extraction_path,
                &self.cursor,
                &self.config.predicate,
                false,
            );
            // No event when nothing is new: avoids wire chatter.
            for item in &pass.new_items {
                let event = StreamEvent::Item {
                    index: item.index,
                    data: item.value.clone(),
                };
                if tx.send(event).await.is_err() {
                    return false;
                }
            }
            self.cursor.commit(&pass.new_items, self.buffer.len());
        }

        true
    }

    /// One authoritative strict parse of the full buffer into the terminal
    /// frame. Progressive tolerant parsing is over at this point; a buffer
    /// that does not parse, or a path that never resolved, is a parse error.
    fn finalize(&mut self) -> StreamEvent {
        if !self.mode.emits_items() {
            return StreamEvent::Completion {
                data: Value::String(std::mem::take(&mut self.buffer)),
            };
        }

        let mut document: Value = match serde_json::from_str(&self.buffer) {
            Ok(document) => document,
            Err(e) => {
                return StreamEvent::from_error(&Error::Parse(format!(
                    "final buffer is not valid JSON: {e}"
                )))
            }
        };

        if self.config.extraction_path.resolve(&document).is_none() {
            return StreamEvent::from_error(&Error::Parse(format!(
                "extraction path {} never resolved in the final document",
                self.config.extraction_path
            )));
        }

        let dropped = extract::filter_final(
            &mut document,
            &self.config.extraction_path,
            &self.config.predicate,
        );
        if dropped > 0 {
            warn!(
                "session {} dropped {} record(s) that stayed truncated through the final parse",
                self.id, dropped
            );
        }

        StreamEvent::Completion { data: document }
    }
}
