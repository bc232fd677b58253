//! Dot-delimited locator for the target array inside a JSON document

use crate::error::{Error, Result};
use serde_json::Value;

/// Parsed extraction path, e.g. `data.items`.
///
/// An empty path addresses the document root, for upstream documents that are
/// themselves the target array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionPath {
    segments: Vec<String>,
    raw: String,
}

impl ExtractionPath {
    /// Parse a dot-delimited path. Empty input addresses the root.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Ok(Self {
                segments: Vec::new(),
                raw: String::new(),
            });
        }

        let segments: Vec<String> = raw.split('.').map(str::to_string).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(Error::Config(format!("invalid extraction path: {raw:?}")));
        }

        Ok(Self {
            segments,
            raw: raw.to_string(),
        })
    }

    /// Walk the path through `root`. `None` means an ancestor has not
    /// appeared in the document yet, which is not an error during streaming.
    pub fn resolve<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        let mut current = root;
        for segment in &self.segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Mutable variant of [`resolve`](Self::resolve), used by the final
    /// authoritative pass to filter the target array in place.
    pub fn resolve_mut<'a>(&self, root: &'a mut Value) -> Option<&'a mut Value> {
        let mut current = root;
        for segment in &self.segments {
            current = current.as_object_mut()?.get_mut(segment)?;
        }
        Some(current)
    }
}

impl std::str::FromStr for ExtractionPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl std::fmt::Display for ExtractionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}
