//! Client-visible stream state and the event dispatcher

use crate::mode::StreamingMode;
use crate::protocol::StreamEvent;
use serde::Serialize;
use serde_json::Value;

/// Lifecycle of one consumer session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    Idle,
    Connecting,
    Streaming,
    Complete,
    Error,
}

impl Default for StreamStatus {
    fn default() -> Self {
        Self::Idle
    }
}

/// Terminal error surfaced to collaborators
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

/// Reactive state owned by the consumer, read-only to collaborators.
///
/// `partial_items` only grows and survives an error; collaborators are
/// expected to keep showing the preview alongside the failure. `final_value`
/// is the authoritative result; the preview may be superseded by it without
/// matching in cardinality or order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClientStreamState {
    pub status: StreamStatus,
    pub partial_items: Vec<Value>,
    pub text: String,
    pub final_value: Option<Value>,
    pub error: Option<ErrorInfo>,
}

/// Apply one decoded event to the state.
///
/// The single dispatch point for the whole state machine: every transition
/// out of `connecting`/`streaming` happens here, and nowhere else.
pub(crate) fn dispatch(state: &mut ClientStreamState, event: StreamEvent, mode: StreamingMode) {
    // First valid frame of any kind moves the session out of connecting.
    if state.status == StreamStatus::Connecting {
        state.status = StreamStatus::Streaming;
    }

    // The server already filters by its resolved mode; a consumer asked for
    // `auto` therefore acts on whatever arrives.
    let accept_text = mode.emits_text() || mode.is_auto();
    let accept_items = mode.emits_items() || mode.is_auto();

    match event {
        StreamEvent::TextChunk { content } => {
            if accept_text {
                state.text.push_str(&content);
            }
        }
        StreamEvent::Item { data, .. } => {
            if accept_items {
                state.partial_items.push(data);
            }
        }
        StreamEvent::Completion { data } => {
            state.status = StreamStatus::Complete;
            state.final_value = Some(data);
        }
        StreamEvent::Error { code, message } => {
            state.status = StreamStatus::Error;
            state.error = Some(ErrorInfo { code, message });
        }
    }
}
