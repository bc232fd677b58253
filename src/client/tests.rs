//! Tests for the consumer state machine and cancellation gate

use super::state::{dispatch, ClientStreamState, StreamStatus};
use super::{StreamConsumer, StreamRequest};
use crate::mode::StreamingMode;
use crate::protocol::StreamEvent;
use serde_json::json;

fn item(index: usize) -> StreamEvent {
    StreamEvent::Item {
        index,
        data: json!({"name": format!("cause-{index}")}),
    }
}

#[test]
fn first_frame_moves_connecting_to_streaming() {
    let mut state = ClientStreamState {
        status: StreamStatus::Connecting,
        ..Default::default()
    };

    dispatch(&mut state, item(0), StreamingMode::Structured);
    assert_eq!(state.status, StreamStatus::Streaming);
    assert_eq!(state.partial_items.len(), 1);
}

#[test]
fn items_accumulate_in_order() {
    let mut state = ClientStreamState::default();
    for i in 0..3 {
        dispatch(&mut state, item(i), StreamingMode::Structured);
    }

    let names: Vec<&str> = state
        .partial_items
        .iter()
        .map(|v| v["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["cause-0", "cause-1", "cause-2"]);
}

#[test]
fn completion_sets_final_value_and_keeps_preview() {
    let mut state = ClientStreamState {
        status: StreamStatus::Streaming,
        ..Default::default()
    };
    dispatch(&mut state, item(0), StreamingMode::Structured);
    dispatch(
        &mut state,
        StreamEvent::Completion {
            data: json!([{"name": "cause-0"}, {"name": "cause-1"}]),
        },
        StreamingMode::Structured,
    );

    assert_eq!(state.status, StreamStatus::Complete);
    // The preview is best-effort; the final value is authoritative and may
    // hold more records than were streamed.
    assert_eq!(state.partial_items.len(), 1);
    assert_eq!(state.final_value.unwrap().as_array().unwrap().len(), 2);
}

#[test]
fn error_preserves_partial_items() {
    // Scenario C, client half.
    let mut state = ClientStreamState {
        status: StreamStatus::Streaming,
        ..Default::default()
    };
    dispatch(&mut state, item(0), StreamingMode::Structured);
    dispatch(
        &mut state,
        StreamEvent::Error {
            code: "upstream_error".into(),
            message: "provider outage".into(),
        },
        StreamingMode::Structured,
    );

    assert_eq!(state.status, StreamStatus::Error);
    assert_eq!(state.partial_items.len(), 1);
    assert_eq!(state.error.as_ref().unwrap().code, "upstream_error");
}

#[test]
fn structured_mode_ignores_text_chunks() {
    let mut state = ClientStreamState::default();
    dispatch(
        &mut state,
        StreamEvent::TextChunk {
            content: "noise".into(),
        },
        StreamingMode::Structured,
    );
    assert!(state.text.is_empty());
}

#[test]
fn text_mode_ignores_items() {
    let mut state = ClientStreamState::default();
    dispatch(&mut state, item(0), StreamingMode::Text);
    assert!(state.partial_items.is_empty());
}

#[test]
fn auto_mode_accepts_both_kinds() {
    let mut state = ClientStreamState::default();
    dispatch(
        &mut state,
        StreamEvent::TextChunk {
            content: "thinking ".into(),
        },
        StreamingMode::Auto,
    );
    dispatch(&mut state, item(0), StreamingMode::Auto);

    assert_eq!(state.text, "thinking ");
    assert_eq!(state.partial_items.len(), 1);
}

#[tokio::test]
async fn consumer_starts_idle() {
    let consumer = StreamConsumer::new();
    let state = consumer.state();
    assert_eq!(state.status, StreamStatus::Idle);
    assert!(state.partial_items.is_empty());
    assert!(state.final_value.is_none());
}

#[tokio::test]
async fn cancel_without_start_is_a_no_op() {
    let mut consumer = StreamConsumer::new();
    consumer.cancel();
    assert_eq!(consumer.state().status, StreamStatus::Idle);
}

#[tokio::test]
async fn start_publishes_connecting_synchronously() {
    let mut consumer = StreamConsumer::new();
    // Nothing listens on this port; the task will churn through retries, but
    // the caller-visible state flips to connecting before start returns.
    consumer.start(StreamRequest::new(
        "http://127.0.0.1:1/api/v1/stream",
        json!({}),
    ));
    assert_eq!(consumer.state().status, StreamStatus::Connecting);
    consumer.cancel();
}

#[tokio::test]
async fn cancel_freezes_observable_state() {
    let mut consumer = StreamConsumer::new();
    consumer.start(StreamRequest::new(
        "http://127.0.0.1:1/api/v1/stream",
        json!({}),
    ));
    consumer.cancel();

    let frozen = consumer.state();
    // Give any straggler a chance to (incorrectly) publish.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let after = consumer.state();
    assert_eq!(frozen.status, after.status);
    assert!(after.error.is_none());
}

#[tokio::test]
async fn reset_returns_to_fresh_idle() {
    let mut consumer = StreamConsumer::new();
    consumer.start(StreamRequest::new(
        "http://127.0.0.1:1/api/v1/stream",
        json!({}),
    ));
    consumer.reset();

    let state = consumer.state();
    assert_eq!(state.status, StreamStatus::Idle);
    assert!(state.partial_items.is_empty());
    assert!(state.error.is_none());
}
