//! HTTP upstream producer with bounded connection retry

use super::{backoff_delay_ms, is_retryable, TokenStream, UpstreamProducer};
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Producer that opens a streaming completion over HTTP.
///
/// The endpoint is expected to accept the request payload as a JSON body and
/// answer with a chunked plain-text body of tokens. Transient failures are
/// retried a bounded number of times with exponential backoff; retry stops
/// the moment a stream is handed to the session.
pub struct HttpProducer {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    max_retries: u32,
    retry_delay_ms: u64,
}

impl HttpProducer {
    pub fn new(
        endpoint: String,
        api_key: Option<String>,
        max_retries: u32,
        retry_delay_ms: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            api_key,
            max_retries,
            retry_delay_ms,
        })
    }

    async fn connect(&self, payload: &Value) -> Result<reqwest::Response> {
        let mut request = self.client.post(&self.endpoint).json(payload);
        if let Some(key) = &self.api_key {
            request = request.header("authorization", format!("Bearer {key}"));
        }

        let response = request.send().await?;
        match response.status() {
            StatusCode::OK => Ok(response),
            StatusCode::TOO_MANY_REQUESTS => {
                Err(Error::Upstream("rate limit exceeded".to_string()))
            }
            StatusCode::UNAUTHORIZED => Err(Error::Upstream("invalid api key".to_string())),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(Error::Upstream(format!("upstream status {status}: {body}")))
            }
        }
    }
}

#[async_trait]
impl UpstreamProducer for HttpProducer {
    async fn open(&self, payload: &Value) -> Result<TokenStream> {
        let mut attempt = 0;
        let response = loop {
            match self.connect(payload).await {
                Ok(response) => break response,
                Err(e) => {
                    attempt += 1;
                    if attempt > self.max_retries || !is_retryable(&e) {
                        return Err(e);
                    }
                    let delay = backoff_delay_ms(self.retry_delay_ms, attempt);
                    warn!(
                        "upstream connect attempt {} failed ({}), retrying in {}ms",
                        attempt, e, delay
                    );
                    sleep(Duration::from_millis(delay)).await;
                }
            }
        };

        debug!("upstream stream opened against {}", self.endpoint);

        let mut decoder = Utf8ChunkDecoder::default();
        let stream = response.bytes_stream().filter_map(move |chunk| {
            let item = match chunk {
                Ok(bytes) => match decoder.push(&bytes) {
                    Ok(text) if text.is_empty() => None,
                    Ok(text) => Some(Ok(text)),
                    Err(e) => Some(Err(e)),
                },
                Err(e) => Some(Err(Error::Request(e))),
            };
            futures::future::ready(item)
        });

        Ok(Box::pin(stream))
    }
}

/// Reassembles UTF-8 text from byte chunks that may split a code point.
#[derive(Default)]
struct Utf8ChunkDecoder {
    pending: Vec<u8>,
}

impl Utf8ChunkDecoder {
    fn push(&mut self, bytes: &[u8]) -> Result<String> {
        self.pending.extend_from_slice(bytes);
        match std::str::from_utf8(&self.pending) {
            Ok(text) => {
                let text = text.to_string();
                self.pending.clear();
                Ok(text)
            }
            Err(e) if e.error_len().is_none() => {
                // Clean split mid code point: hold the tail for the next chunk.
                let valid = e.valid_up_to();
                let text = String::from_utf8_lossy(&self.pending[..valid]).into_owned();
                self.pending.drain(..valid);
                Ok(text)
            }
            Err(e) => Err(Error::Upstream(format!("upstream sent invalid UTF-8: {e}"))),
        }
    }
}
