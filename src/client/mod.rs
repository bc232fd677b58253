//! Client stream consumer
//!
//! Opens the long-lived HTTP response, decodes frames, and maintains the
//! reactive [`ClientStreamState`] behind a watch channel. One tokio task per
//! session owns the connection, the decoder, and the raw buffer; the caller
//! never blocks. Cancellation is synchronous from the caller's point of
//! view: after `cancel()` returns, no further state mutation is observable,
//! whatever is still in flight on the wire.

pub mod state;

#[cfg(test)]
mod tests;

pub use state::{ClientStreamState, ErrorInfo, StreamStatus};

use crate::error::{Error, Result};
use crate::mode::StreamingMode;
use crate::producer::backoff_delay_ms;
use crate::protocol::{FrameDecoder, StreamEvent};
use futures_util::StreamExt;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Immutable description of one streaming call
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub endpoint: String,
    pub payload: Value,
    /// Which event kinds this consumer acts on; `Auto` accepts whatever the
    /// server's resolved mode produces
    pub mode: StreamingMode,
}

impl StreamRequest {
    pub fn new(endpoint: impl Into<String>, payload: Value) -> Self {
        Self {
            endpoint: endpoint.into(),
            payload,
            mode: StreamingMode::Auto,
        }
    }

    pub fn with_mode(mut self, mode: StreamingMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Bounded retry applied only while connecting
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 200,
        }
    }
}

/// Consumer half of the streaming pipeline
pub struct StreamConsumer {
    http: reqwest::Client,
    retry: RetryConfig,
    state_tx: Arc<watch::Sender<ClientStreamState>>,
    task: Option<SessionTask>,
}

struct SessionTask {
    handle: JoinHandle<()>,
    canceled: Arc<AtomicBool>,
}

impl Default for StreamConsumer {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamConsumer {
    pub fn new() -> Self {
        Self::with_retry(RetryConfig::default())
    }

    pub fn with_retry(retry: RetryConfig) -> Self {
        let (state_tx, _) = watch::channel(ClientStreamState::default());
        Self {
            http: reqwest::Client::new(),
            retry,
            state_tx: Arc::new(state_tx),
            task: None,
        }
    }

    /// Current state snapshot
    pub fn state(&self) -> ClientStreamState {
        self.state_tx.borrow().clone()
    }

    /// Watch channel over every state update; nothing is coalesced away.
    pub fn subscribe(&self) -> watch::Receiver<ClientStreamState> {
        self.state_tx.subscribe()
    }

    /// Begin a streaming session. An in-flight session is canceled first and
    /// the published state starts over from a fresh `connecting`.
    pub fn start(&mut self, request: StreamRequest) {
        self.cancel();

        self.state_tx.send_replace(ClientStreamState {
            status: StreamStatus::Connecting,
            ..Default::default()
        });

        let canceled = Arc::new(AtomicBool::new(false));
        let publisher = StatePublisher {
            tx: self.state_tx.clone(),
            canceled: canceled.clone(),
        };
        let handle = tokio::spawn(run_stream(
            self.http.clone(),
            request,
            self.retry.clone(),
            publisher,
        ));
        self.task = Some(SessionTask { handle, canceled });
    }

    /// Stop the session immediately. The underlying connection close is
    /// requested synchronously; no state mutation is observable afterward.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.canceled.store(true, Ordering::SeqCst);
            task.handle.abort();
        }
    }

    /// Cancel and return the published state to `idle`.
    pub fn reset(&mut self) {
        self.cancel();
        self.state_tx.send_replace(ClientStreamState::default());
    }
}

impl Drop for StreamConsumer {
    // Detach (unmount-equivalent) closes the connection the same way an
    // explicit cancel does.
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Gate between the session task and the watch channel. Once the canceled
/// flag is set, every publish becomes a no-op, making cancellation total
/// even for events already decoded.
struct StatePublisher {
    tx: Arc<watch::Sender<ClientStreamState>>,
    canceled: Arc<AtomicBool>,
}

impl StatePublisher {
    fn publish(&self, update: impl FnOnce(&mut ClientStreamState)) -> bool {
        if self.canceled.load(Ordering::SeqCst) {
            return false;
        }
        self.tx.send_modify(update);
        true
    }
}

async fn run_stream(
    http: reqwest::Client,
    request: StreamRequest,
    retry: RetryConfig,
    publisher: StatePublisher,
) {
    let mut attempt = 0;
    loop {
        let mut saw_frame = false;
        match attempt_stream(&http, &request, &publisher, &mut saw_frame).await {
            Ok(()) => return,
            Err(e) => {
                // Retry is only legal before the first byte of real content.
                if !saw_frame && attempt < retry.max_attempts {
                    attempt += 1;
                    let delay = backoff_delay_ms(retry.initial_delay_ms, attempt);
                    debug!(
                        "connect attempt {} failed ({}), retrying in {}ms",
                        attempt, e, delay
                    );
                    sleep(Duration::from_millis(delay)).await;
                    continue;
                }

                warn!("stream failed: {}", e);
                let event = StreamEvent::from_error(&e);
                publisher.publish(|s| state::dispatch(s, event, request.mode));
                return;
            }
        }
    }
}

/// One connection attempt, driven until a terminal frame or a failure.
async fn attempt_stream(
    http: &reqwest::Client,
    request: &StreamRequest,
    publisher: &StatePublisher,
    saw_frame: &mut bool,
) -> Result<()> {
    let response = http
        .post(&request.endpoint)
        .json(&request.payload)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(Error::Protocol(format!(
            "unexpected HTTP status {}",
            response.status()
        )));
    }

    let mut decoder = FrameDecoder::new();
    let mut bytes = response.bytes_stream();
    let mut terminal_seen = false;

    while let Some(chunk) = bytes.next().await {
        let chunk = chunk?;
        for event in decoder.feed(&chunk)? {
            *saw_frame = true;
            let terminal = event.is_terminal();
            if !publisher.publish(|s| state::dispatch(s, event, request.mode)) {
                // Canceled while this chunk was in flight; stop silently.
                return Ok(());
            }
            if terminal {
                terminal_seen = true;
            }
        }
        if terminal_seen {
            return Ok(());
        }
    }

    decoder.finish()?;
    if terminal_seen {
        Ok(())
    } else {
        Err(Error::Protocol(
            "stream ended without a terminal frame".to_string(),
        ))
    }
}
