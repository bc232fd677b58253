//! Progressive extraction of structured records from a growing buffer
//!
//! The extraction engine is pure: given the accumulated completion text, a
//! path to the target array, and the set of indices already surfaced, it
//! reports which elements have become structurally complete since the last
//! call. It never performs I/O and never fails: an unparseable buffer just
//! means "no new items yet".

pub mod path;
pub mod repair;


pub use path::ExtractionPath;
pub use repair::parse_partial;

use serde_json::Value;
use std::collections::BTreeSet;

/// One newly-completed element of the target array
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedItem {
    pub index: usize,
    pub value: Value,
}

/// Result of one extraction pass
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    /// Elements that became complete since the indices recorded in the cursor
    pub new_items: Vec<CompletedItem>,
    /// Whether the buffer is still a truncated prefix of the final document
    pub still_incomplete: bool,
}

/// Per-session record of what has already been surfaced.
///
/// The emitted set only grows, and an index never re-enters `new_items` once
/// committed. Re-extraction of a longer buffer yields the same value for any
/// previously committed index, so items are immutable once complete.
#[derive(Debug, Clone, Default)]
pub struct ExtractionCursor {
    emitted: BTreeSet<usize>,
    /// Buffer length at the last commit, a cheap re-parse gate
    processed_len: usize,
}

impl ExtractionCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_emitted(&self, index: usize) -> bool {
        self.emitted.contains(&index)
    }

    pub fn emitted_count(&self) -> usize {
        self.emitted.len()
    }

    pub fn processed_len(&self) -> usize {
        self.processed_len
    }

    /// Record an extraction pass as delivered downstream.
    pub fn commit(&mut self, items: &[CompletedItem], buffer_len: usize) {
        for item in items {
            self.emitted.insert(item.index);
        }
        self.processed_len = self.processed_len.max(buffer_len);
    }
}

/// Structural completeness check for a single array element.
///
/// Guards against records that are valid JSON but semantically truncated,
/// e.g. a name field cut off mid-word. String fields must be non-empty and at
/// least `min_string_len` characters; `required_keys` must all be present on
/// object elements.
#[derive(Debug, Clone, Default)]
pub struct ItemPredicate {
    pub required_keys: Vec<String>,
    pub min_string_len: usize,
}

impl ItemPredicate {
    pub fn accepts(&self, value: &Value) -> bool {
        match value {
            Value::Object(map) => {
                if !self.required_keys.iter().all(|k| map.contains_key(k)) {
                    return false;
                }
                map.values().all(|v| self.accepts_scalar(v))
            }
            other => self.accepts_scalar(other),
        }
    }

    fn accepts_scalar(&self, value: &Value) -> bool {
        match value {
            Value::String(s) => !s.is_empty() && s.chars().count() >= self.min_string_len,
            _ => true,
        }
    }
}

/// One extraction pass over the buffer.
///
/// `final_pass` lifts the last-visible-element rule: mid-stream, the trailing
/// element of the array may still be generating and is always provisional;
/// once the upstream has signaled completion that caution no longer applies.
///
/// Pure and idempotent: identical `buffer` and `cursor` produce identical
/// `new_items`.
pub fn extract(
    buffer: &str,
    path: &ExtractionPath,
    cursor: &ExtractionCursor,
    predicate: &ItemPredicate,
    final_pass: bool,
) -> Extraction {
    let incomplete = Extraction {
        new_items: Vec::new(),
        still_incomplete: true,
    };

    if buffer.trim().is_empty() {
        return incomplete;
    }

    let strict = serde_json::from_str::<Value>(buffer).ok();
    let strictly_complete = strict.is_some();
    let document = match strict {
        Some(v) => v,
        None => match repair::parse_partial(buffer) {
            Some(v) => v,
            None => return incomplete,
        },
    };

    let Some(target) = path.resolve(&document) else {
        return incomplete;
    };
    let Some(elements) = target.as_array() else {
        // The path resolves to a non-array while streaming; treat as an
        // ancestor that has not fully appeared. The authoritative pass
        // reports this as a hard parse error instead.
        return incomplete;
    };

    let mut new_items = Vec::new();
    let last_visible = elements.len().saturating_sub(1);
    for (index, element) in elements.iter().enumerate() {
        if cursor.is_emitted(index) {
            continue;
        }
        if index == last_visible && !final_pass {
            // Trailing element may still be mid-generation.
            continue;
        }
        if !predicate.accepts(element) {
            continue;
        }
        new_items.push(CompletedItem {
            index,
            value: element.clone(),
        });
    }

    Extraction {
        new_items,
        still_incomplete: !(final_pass && strictly_complete),
    }
}

/// Drop elements of the array at `path` that still fail the predicate.
///
/// Used by the final authoritative pass: a persistently truncated record is
/// removed from the result rather than failing the whole session. Returns the
/// number of dropped elements; zero when the path does not address an array.
pub fn filter_final(document: &mut Value, path: &ExtractionPath, predicate: &ItemPredicate) -> usize {
    let Some(target) = path.resolve_mut(document) else {
        return 0;
    };
    let Some(elements) = target.as_array_mut() else {
        return 0;
    };
    let before = elements.len();
    elements.retain(|element| predicate.accepts(element));
    before - elements.len()
}
