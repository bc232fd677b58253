//! Upstream token producer abstraction
//!
//! The pipeline treats text generation as an external collaborator: anything
//! that can open a stream of token batches for a request payload. The HTTP
//! producer talks to a real completion endpoint; the scripted producer feeds
//! canned batches for tests and local runs.

pub mod http;
pub mod scripted;

pub use http::HttpProducer;
pub use scripted::{ScriptedBatch, ScriptedProducer};

use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

/// Stream of token batches from the upstream generator.
///
/// Exclusively owned by one session orchestrator for the session's lifetime;
/// dropping it releases the upstream resource.
pub type TokenStream = BoxStream<'static, Result<String>>;

/// An upstream text-generation source
#[async_trait]
pub trait UpstreamProducer: Send + Sync {
    /// Open a token stream for one request payload.
    async fn open(&self, payload: &Value) -> Result<TokenStream>;
}

/// Whether an upstream failure is worth another connection attempt.
///
/// Only consulted before anything has been emitted downstream; once a session
/// is streaming, failures are terminal.
pub fn is_retryable(error: &Error) -> bool {
    match error {
        Error::Timeout(_) => true,
        Error::Request(e) => e.is_timeout() || e.is_connect(),
        Error::Upstream(msg) => {
            msg.contains("rate limit") || msg.contains("timeout") || msg.contains("connection")
        }
        _ => false,
    }
}

/// Exponential backoff delay for connection attempt `attempt` (1-based),
/// with a small random jitter to avoid thundering retries.
pub fn backoff_delay_ms(base_ms: u64, attempt: u32) -> u64 {
    let exp = base_ms.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
    let jitter = rand::random_range(0..=base_ms / 4 + 1);
    exp + jitter
}
