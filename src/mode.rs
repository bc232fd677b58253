//! Streaming mode policy shared by server and client
//!
//! A mode decides which event kinds a session produces and which kinds a
//! consumer acts on. `Auto` resolves itself from the first non-trivial
//! fragment of output and is then fixed for the rest of the session.

use serde::{Deserialize, Serialize};

/// How a session's byte stream is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamingMode {
    /// Structured records only; free text is suppressed
    Structured,
    /// Both text chunks and structured records
    Hybrid,
    /// Free text only; no item events, completion carries the final text
    Text,
    /// Decide between structured and text from the first fragment
    Auto,
}

impl Default for StreamingMode {
    fn default() -> Self {
        Self::Structured
    }
}

impl StreamingMode {
    /// Whether sessions in this mode emit `text_chunk` events
    pub fn emits_text(self) -> bool {
        matches!(self, Self::Hybrid | Self::Text)
    }

    /// Whether sessions in this mode emit `item` events
    pub fn emits_items(self) -> bool {
        matches!(self, Self::Structured | Self::Hybrid)
    }

    /// Whether this mode still needs resolution against buffer content
    pub fn is_auto(self) -> bool {
        matches!(self, Self::Auto)
    }

    /// Resolve `Auto` against the first non-trivial fragment of the buffer.
    ///
    /// Returns `None` while the fragment is all whitespace (not enough signal
    /// yet). Once a decision is made the caller must pin it for the session;
    /// there is no mid-stream mode flapping.
    pub fn detect(fragment: &str) -> Option<StreamingMode> {
        let first = fragment.chars().find(|c| !c.is_whitespace())?;
        if first == '{' || first == '[' {
            Some(StreamingMode::Structured)
        } else {
            Some(StreamingMode::Text)
        }
    }
}

impl std::str::FromStr for StreamingMode {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "structured" => Ok(Self::Structured),
            "hybrid" => Ok(Self::Hybrid),
            "text" => Ok(Self::Text),
            "auto" => Ok(Self::Auto),
            other => Err(crate::error::Error::Config(format!(
                "unknown streaming mode: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for StreamingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Structured => "structured",
            Self::Hybrid => "hybrid",
            Self::Text => "text",
            Self::Auto => "auto",
        };
        write!(f, "{s}")
    }
}
