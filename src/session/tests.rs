//! Tests for the session orchestrator

use super::{SessionConfig, StreamSession};
use crate::extract::{ExtractionPath, ItemPredicate};
use crate::mode::StreamingMode;
use crate::producer::{ScriptedBatch, ScriptedProducer, UpstreamProducer};
use crate::protocol::StreamEvent;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn config(mode: StreamingMode, path: &str) -> SessionConfig {
    SessionConfig {
        mode,
        extraction_path: ExtractionPath::parse(path).unwrap(),
        predicate: ItemPredicate::default(),
        idle_timeout: Duration::from_secs(5),
        max_connect_retries: 2,
        retry_delay_ms: 10,
    }
}

async fn run_collect(
    producer: Arc<dyn UpstreamProducer>,
    config: SessionConfig,
) -> Vec<StreamEvent> {
    let (tx, mut rx) = mpsc::channel(16);
    let session = StreamSession::new(config);
    let handle = tokio::spawn(session.run(producer, json!({}), tx));

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    handle.await.unwrap();
    events
}

fn terminal_count(events: &[StreamEvent]) -> usize {
    events.iter().filter(|e| e.is_terminal()).count()
}

#[tokio::test]
async fn structured_mode_streams_items_progressively() {
    let producer = Arc::new(ScriptedProducer::new(vec![
        ScriptedBatch::Tokens(r#"[{"a":1},"#.into()),
        ScriptedBatch::Tokens(r#"{"a":2},"#.into()),
        ScriptedBatch::Tokens(r#"{"a":3}]"#.into()),
    ]));

    let events = run_collect(producer, config(StreamingMode::Structured, "")).await;

    assert_eq!(
        events,
        vec![
            StreamEvent::Item {
                index: 0,
                data: json!({"a": 1})
            },
            StreamEvent::Item {
                index: 1,
                data: json!({"a": 2})
            },
            StreamEvent::Completion {
                data: json!([{"a": 1}, {"a": 2}, {"a": 3}])
            },
        ]
    );
    assert_eq!(terminal_count(&events), 1);
}

#[tokio::test]
async fn whole_array_in_one_batch_withholds_last_element() {
    // Scenario B: items 0 and 1 stream, index 2 arrives with completion.
    let producer = Arc::new(ScriptedProducer::new(vec![ScriptedBatch::Tokens(
        r#"[{"a":1},{"a":2},{"a":3}]"#.into(),
    )]));

    let events = run_collect(producer, config(StreamingMode::Structured, "")).await;

    let item_indices: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Item { index, .. } => Some(*index),
            _ => None,
        })
        .collect();
    assert_eq!(item_indices, vec![0, 1]);

    match events.last().unwrap() {
        StreamEvent::Completion { data } => {
            assert_eq!(data.as_array().unwrap().len(), 3);
        }
        other => panic!("expected completion, got {other:?}"),
    }
}

#[tokio::test]
async fn nested_path_streams_wizard_records() {
    let producer = Arc::new(ScriptedProducer::new(vec![
        ScriptedBatch::Tokens(r#"{"data":{"items":[{"name":"Str"#.into()),
        ScriptedBatch::Tokens(r#"ess"},{"name":"Fatigue"},"#.into()),
        ScriptedBatch::Tokens(r#"{"name":"Sleep"}]}}"#.into()),
    ]));

    let events = run_collect(producer, config(StreamingMode::Structured, "data.items")).await;

    // Chunk 1 completes nothing; "Stress" becomes complete once a successor
    // element is visible.
    assert_eq!(
        events[0],
        StreamEvent::Item {
            index: 0,
            data: json!({"name": "Stress"})
        }
    );
    assert_eq!(terminal_count(&events), 1);
}

#[tokio::test]
async fn upstream_failure_after_item_is_terminal() {
    // Scenario C, server half: one item, then a terminal error frame.
    let producer = Arc::new(ScriptedProducer::new(vec![
        ScriptedBatch::Tokens(r#"[{"a":1},{"a":2},"#.into()),
        ScriptedBatch::Fail("provider outage".into()),
    ]));

    let events = run_collect(producer, config(StreamingMode::Structured, "")).await;

    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], StreamEvent::Item { index: 0, .. }));
    match &events[1] {
        StreamEvent::Error { code, .. } => assert_eq!(code, "upstream_error"),
        other => panic!("expected error, got {other:?}"),
    }
    assert_eq!(terminal_count(&events), 1);
}

#[tokio::test]
async fn text_mode_suppresses_items_and_carries_final_text() {
    let producer = Arc::new(ScriptedProducer::new(vec![
        ScriptedBatch::Tokens("Hello ".into()),
        ScriptedBatch::Tokens("world".into()),
    ]));

    let events = run_collect(producer, config(StreamingMode::Text, "")).await;

    assert_eq!(
        events,
        vec![
            StreamEvent::TextChunk {
                content: "Hello ".into()
            },
            StreamEvent::TextChunk {
                content: "world".into()
            },
            StreamEvent::Completion {
                data: Value::String("Hello world".into())
            },
        ]
    );
}

#[tokio::test]
async fn hybrid_mode_emits_text_and_items() {
    let producer = Arc::new(ScriptedProducer::new(vec![
        ScriptedBatch::Tokens(r#"[{"a":1},"#.into()),
        ScriptedBatch::Tokens(r#"{"a":2}]"#.into()),
    ]));

    let events = run_collect(producer, config(StreamingMode::Hybrid, "")).await;

    assert!(events
        .iter()
        .any(|e| matches!(e, StreamEvent::TextChunk { .. })));
    assert!(events.iter().any(|e| matches!(e, StreamEvent::Item { .. })));
    assert!(matches!(
        events.last().unwrap(),
        StreamEvent::Completion { .. }
    ));
}

#[tokio::test]
async fn auto_mode_resolves_to_structured() {
    let producer = Arc::new(ScriptedProducer::new(vec![
        ScriptedBatch::Tokens("  ".into()),
        ScriptedBatch::Tokens(r#"[{"a":1},{"a":2}]"#.into()),
    ]));

    let events = run_collect(producer, config(StreamingMode::Auto, "")).await;

    assert!(events.iter().any(|e| matches!(e, StreamEvent::Item { .. })));
    assert!(!events
        .iter()
        .any(|e| matches!(e, StreamEvent::TextChunk { .. })));
}

#[tokio::test]
async fn auto_mode_resolves_to_text() {
    let producer = Arc::new(ScriptedProducer::new(vec![
        ScriptedBatch::Tokens("  ".into()),
        ScriptedBatch::Tokens("The most likely cause".into()),
    ]));

    let events = run_collect(producer, config(StreamingMode::Auto, "")).await;

    // The withheld whitespace prefix rides along with the first real chunk.
    assert_eq!(
        events[0],
        StreamEvent::TextChunk {
            content: "  The most likely cause".into()
        }
    );
    assert!(matches!(
        events.last().unwrap(),
        StreamEvent::Completion {
            data: Value::String(_)
        }
    ));
}

#[tokio::test]
async fn invalid_final_buffer_is_a_parse_error() {
    let producer = Arc::new(ScriptedProducer::new(vec![ScriptedBatch::Tokens(
        r#"[{"a":1},"#.into(),
    )]));

    let events = run_collect(producer, config(StreamingMode::Structured, "")).await;

    assert_eq!(events.len(), 1);
    match &events[0] {
        StreamEvent::Error { code, .. } => assert_eq!(code, "parse_error"),
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[tokio::test]
async fn unresolved_path_in_final_document_is_a_parse_error() {
    let producer = Arc::new(ScriptedProducer::new(vec![ScriptedBatch::Tokens(
        r#"{"meta":{"model":"sonnet"}}"#.into(),
    )]));

    let events = run_collect(producer, config(StreamingMode::Structured, "data.items")).await;

    match events.last().unwrap() {
        StreamEvent::Error { code, message } => {
            assert_eq!(code, "parse_error");
            assert!(message.contains("data.items"));
        }
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[tokio::test]
async fn transient_open_failures_are_retried() {
    let producer = Arc::new(
        ScriptedProducer::new(vec![ScriptedBatch::Tokens(r#"[{"a":1},{"a":2}]"#.into())])
            .with_transient_open_failures(1),
    );

    let events = run_collect(producer.clone(), config(StreamingMode::Structured, "")).await;

    assert!(matches!(
        events.last().unwrap(),
        StreamEvent::Completion { .. }
    ));
    assert_eq!(producer.open_count(), 2);
}

#[tokio::test]
async fn retry_exhaustion_surfaces_upstream_error() {
    let producer = Arc::new(
        ScriptedProducer::new(vec![ScriptedBatch::Tokens("[]".into())])
            .with_transient_open_failures(10),
    );

    let events = run_collect(producer.clone(), config(StreamingMode::Structured, "")).await;

    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], StreamEvent::Error { code, .. } if code == "upstream_error"));
    // Initial attempt plus max_connect_retries.
    assert_eq!(producer.open_count(), 3);
}

#[tokio::test]
async fn idle_upstream_is_treated_as_failure() {
    let producer = Arc::new(ScriptedProducer::new(vec![
        ScriptedBatch::Pause(Duration::from_millis(500)),
        ScriptedBatch::Tokens("[]".into()),
    ]));

    let mut cfg = config(StreamingMode::Structured, "");
    cfg.idle_timeout = Duration::from_millis(50);
    let events = run_collect(producer, cfg).await;

    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], StreamEvent::Error { code, .. } if code == "upstream_timeout"));
}

#[tokio::test]
async fn client_disconnect_stops_upstream_pull() {
    let producer = Arc::new(ScriptedProducer::new(vec![
        ScriptedBatch::Tokens(r#"[{"a":1},{"a":2},"#.into()),
        ScriptedBatch::Tokens(r#"{"a":3},"#.into()),
        ScriptedBatch::Tokens(r#"{"a":4},"#.into()),
        ScriptedBatch::Tokens(r#"{"a":5}]"#.into()),
    ]));

    let (tx, mut rx) = mpsc::channel(1);
    let session = StreamSession::new(config(StreamingMode::Structured, ""));
    let handle = tokio::spawn(session.run(producer.clone(), json!({}), tx));

    // Take the first item, then walk away.
    let first = rx.recv().await.unwrap();
    assert!(matches!(first, StreamEvent::Item { index: 0, .. }));
    drop(rx);

    handle.await.unwrap();
    assert!(producer.batches_served() < 4);
}

#[tokio::test]
async fn persistently_truncated_records_are_dropped_from_completion() {
    let producer = Arc::new(ScriptedProducer::new(vec![ScriptedBatch::Tokens(
        r#"[{"name":"Stress"},{"name":"Fa"},{"name":"Sleep"}]"#.into(),
    )]));

    let mut cfg = config(StreamingMode::Structured, "");
    cfg.predicate = ItemPredicate {
        required_keys: vec!["name".into()],
        min_string_len: 3,
    };
    let events = run_collect(producer, cfg).await;

    // The short record is neither streamed nor present in the final value.
    assert!(!events.iter().any(|e| matches!(
        e,
        StreamEvent::Item { data, .. } if data == &json!({"name": "Fa"})
    )));
    match events.last().unwrap() {
        StreamEvent::Completion { data } => {
            assert_eq!(data, &json!([{"name": "Stress"}, {"name": "Sleep"}]));
        }
        other => panic!("expected completion, got {other:?}"),
    }
}
