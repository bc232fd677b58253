//! HTTP server exposing the streaming pipeline
//!
//! One route does the work: `POST /api/v1/stream` answers with a chunked 200
//! response of newline-delimited event frames. Errors after the route matches
//! travel as protocol `error` frames, never as HTTP error statuses; the
//! response has conceptually begun streaming. `GET /api/v1/health` reports
//! liveness.

use crate::config::Config;
use crate::error::Error;
use crate::extract::ExtractionPath;
use crate::mode::StreamingMode;
use crate::producer::UpstreamProducer;
use crate::protocol::{encode_frame, StreamEvent};
use crate::registry::PromptRegistry;
use crate::session::{SessionConfig, StreamSession};
use axum::{
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

/// Inbound request body for one streaming call
#[derive(Debug, Clone, Deserialize)]
pub struct StreamRequest {
    pub feature: String,
    pub step: String,
    #[serde(default)]
    pub data: Value,
    pub streaming_mode: Option<StreamingMode>,
}

/// Streaming pipeline server
pub struct StreamServer {
    state: Arc<AppState>,
    host: String,
    port: u16,
}

/// Shared server state
pub struct AppState {
    registry: PromptRegistry,
    producer: Arc<dyn UpstreamProducer>,
    config: Config,
    started_at: DateTime<Utc>,
}

impl StreamServer {
    pub fn new(
        config: Config,
        registry: PromptRegistry,
        producer: Arc<dyn UpstreamProducer>,
    ) -> Self {
        let host = config.server.host.clone();
        let port = config.server.port;
        Self {
            state: Arc::new(AppState {
                registry,
                producer,
                config,
                started_at: Utc::now(),
            }),
            host,
            port,
        }
    }

    /// Start the server on the configured address.
    pub async fn start(self) -> anyhow::Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        let app = self.build_router();

        info!("Starting streaming server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// Build the router; exposed so tests can serve on their own listener.
    pub fn build_router(self) -> Router {
        Router::new()
            .route("/api/v1/health", get(health_check))
            .route("/api/v1/stream", post(stream_session))
            .layer(CorsLayer::permissive())
            .with_state(self.state)
    }
}

/// Health payload
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    started_at: DateTime<Utc>,
    registered_prompts: usize,
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        started_at: state.started_at,
        registered_prompts: state.registry.len(),
    })
}

async fn stream_session(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StreamRequest>,
) -> Response {
    let spec = match state.registry.resolve(&request.feature, &request.step) {
        Ok(spec) => spec.clone(),
        Err(e) => {
            warn!("stream request rejected: {}", e);
            return error_stream_response(&e);
        }
    };

    let extraction_path = match ExtractionPath::parse(&spec.extraction_path) {
        Ok(path) => path,
        Err(e) => {
            warn!("prompt spec {}/{} is broken: {}", spec.feature, spec.step, e);
            return error_stream_response(&e);
        }
    };

    let mode = request.streaming_mode.unwrap_or(spec.default_mode);
    let session = StreamSession::new(SessionConfig {
        mode,
        extraction_path,
        predicate: spec.predicate(),
        idle_timeout: state.config.upstream.idle_timeout,
        max_connect_retries: state.config.upstream.max_connect_retries,
        retry_delay_ms: state.config.upstream.retry_delay_ms,
    });

    info!(
        "session {} accepted for {}/{} (mode {})",
        session.id(),
        request.feature,
        request.step,
        mode
    );

    let payload = spec.build_payload(&request.data);
    let (tx, rx) = mpsc::channel(state.config.streaming.channel_capacity);
    tokio::spawn(session.run(state.producer.clone(), payload, tx));

    frames_response(ReceiverStream::new(rx))
}

/// Stream a channel of events out as the NDJSON response body.
fn frames_response(events: ReceiverStream<StreamEvent>) -> Response {
    let body = Body::from_stream(events.map(|event| {
        encode_frame(&event).map_err(|e| std::io::Error::other(e.to_string()))
    }));

    (
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        body,
    )
        .into_response()
}

/// A request that fails before a session spawns still answers 200 with a
/// single terminal error frame, keeping the protocol uniform for clients.
fn error_stream_response(error: &Error) -> Response {
    let frame = StreamEvent::from_error(error);
    let (tx, rx) = mpsc::channel(1);
    // The frame fits the channel bound; send cannot fail.
    let _ = tx.try_send(frame);
    frames_response(ReceiverStream::new(rx))
}
