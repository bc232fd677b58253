//! Tolerant JSON parsing for truncated buffers
//!
//! A streamed completion is almost never valid JSON mid-generation. This
//! module attempts a strict parse first and, on failure, applies one bounded
//! repair pass: close an open string, drop a dangling separator, and append
//! the closing delimiters implied by the open-bracket stack. The repaired
//! text gets exactly one retry; if that also fails the buffer is simply not
//! parseable yet.

use serde_json::Value;

/// Best-effort parse of a possibly-truncated JSON buffer.
///
/// Returns `None` when the buffer is not a prefix of any valid JSON document
/// this routine can repair. Never errors.
pub fn parse_partial(buffer: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(buffer) {
        return Some(value);
    }

    let repaired = repair_truncated(buffer)?;
    serde_json::from_str::<Value>(&repaired).ok()
}

/// Single bounded repair pass over a truncated buffer.
///
/// Scans once, tracking string state and the open-delimiter stack, then:
/// terminates an open string (dropping a trailing lone escape), trims a
/// dangling `,`, completes a dangling `:` with `null`, and closes every
/// delimiter still open. No other heuristics are attempted.
fn repair_truncated(buffer: &str) -> Option<String> {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in buffer.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => stack.push(c),
            '}' => {
                if stack.pop() != Some('{') {
                    return None;
                }
            }
            ']' => {
                if stack.pop() != Some('[') {
                    return None;
                }
            }
            _ => {}
        }
    }

    if stack.is_empty() && !in_string {
        // Nothing open: the strict failure was not truncation.
        return None;
    }

    let mut repaired = buffer.to_string();

    if in_string {
        if escaped {
            repaired.pop();
        }
        repaired.push('"');
    } else {
        // Trailing separators leave the repaired document malformed unless
        // completed or removed.
        let trimmed_len = repaired.trim_end().len();
        repaired.truncate(trimmed_len);
        if repaired.ends_with(',') {
            repaired.pop();
        } else if repaired.ends_with(':') {
            repaired.push_str("null");
        }
    }

    for open in stack.iter().rev() {
        repaired.push(match open {
            '{' => '}',
            _ => ']',
        });
    }

    Some(repaired)
}
