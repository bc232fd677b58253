//! Scripted producer for tests and offline runs
//!
//! Plays back a fixed sequence of token batches, optionally pausing between
//! them or failing partway through, so orchestrator and client behavior can
//! be exercised without a live model.

use super::{TokenStream, UpstreamProducer};
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One step of a scripted playback
#[derive(Debug, Clone)]
pub enum ScriptedBatch {
    /// Yield a token batch
    Tokens(String),
    /// Pause before the next batch
    Pause(Duration),
    /// Fail the stream with an upstream error
    Fail(String),
}

/// Producer that replays a canned script on every open.
pub struct ScriptedProducer {
    script: Vec<ScriptedBatch>,
    /// Number of opens that fail with a retryable error before one succeeds
    transient_open_failures: usize,
    opens: Arc<AtomicUsize>,
    batches_served: Arc<AtomicUsize>,
}

impl ScriptedProducer {
    pub fn new(script: Vec<ScriptedBatch>) -> Self {
        Self {
            script,
            transient_open_failures: 0,
            opens: Arc::new(AtomicUsize::new(0)),
            batches_served: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Build a script that splits `text` into batches of `batch_size` chars.
    pub fn from_text(text: &str, batch_size: usize) -> Self {
        let chars: Vec<char> = text.chars().collect();
        let script = chars
            .chunks(batch_size.max(1))
            .map(|c| ScriptedBatch::Tokens(c.iter().collect()))
            .collect();
        Self::new(script)
    }

    /// Make the first `failures` calls to `open` fail with a retryable error.
    pub fn with_transient_open_failures(mut self, failures: usize) -> Self {
        self.transient_open_failures = failures;
        self
    }

    /// How many times `open` has been called
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// How many token batches have been pulled off streams so far
    pub fn batches_served(&self) -> usize {
        self.batches_served.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpstreamProducer for ScriptedProducer {
    async fn open(&self, _payload: &Value) -> Result<TokenStream> {
        let open_index = self.opens.fetch_add(1, Ordering::SeqCst);
        if open_index < self.transient_open_failures {
            return Err(Error::Upstream("connection reset by peer".to_string()));
        }

        let served = self.batches_served.clone();
        let stream = futures::stream::iter(self.script.clone())
            .filter_map(move |batch| {
                let served = served.clone();
                async move {
                    match batch {
                        ScriptedBatch::Tokens(text) => {
                            served.fetch_add(1, Ordering::SeqCst);
                            Some(Ok(text))
                        }
                        ScriptedBatch::Pause(duration) => {
                            tokio::time::sleep(duration).await;
                            None
                        }
                        ScriptedBatch::Fail(message) => Some(Err(Error::Upstream(message))),
                    }
                }
            })
            .boxed();

        Ok(stream)
    }
}
