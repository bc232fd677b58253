//! Prompt and schema registry keyed by feature and step
//!
//! The streaming pipeline treats `feature` + `step` as opaque selectors; this
//! registry resolves them to the upstream prompt template, the extraction
//! path for the target array, and the structural checks a record must pass
//! before it is surfaced. Built-in entries cover the intake wizard; config
//! can add or override entries.

use crate::error::{Error, Result};
use crate::extract::ItemPredicate;
use crate::mode::StreamingMode;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

/// Resolved prompt configuration for one wizard step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptSpec {
    pub feature: String,
    pub step: String,
    /// Prompt template; `{{data}}` is replaced by the request data as JSON
    pub template: String,
    /// Dot-delimited path to the target array in the upstream document
    pub extraction_path: String,
    /// Mode applied when the request does not name one
    #[serde(default)]
    pub default_mode: StreamingMode,
    /// Keys every surfaced record must carry
    #[serde(default)]
    pub required_keys: Vec<String>,
    /// Minimum length for string fields of a surfaced record
    #[serde(default = "default_min_string_len")]
    pub min_string_len: usize,
}

fn default_min_string_len() -> usize {
    1
}

impl PromptSpec {
    /// Render the upstream request payload for one inbound request.
    pub fn build_payload(&self, data: &Value) -> Value {
        let rendered = self.template.replace("{{data}}", &data.to_string());
        json!({
            "prompt": rendered,
            "stream": true,
        })
    }

    /// Structural predicate derived from this spec
    pub fn predicate(&self) -> ItemPredicate {
        ItemPredicate {
            required_keys: self.required_keys.clone(),
            min_string_len: self.min_string_len,
        }
    }
}

static BUILTIN_SPECS: Lazy<Vec<PromptSpec>> = Lazy::new(|| {
    vec![
        PromptSpec {
            feature: "health_concern".to_string(),
            step: "potential_causes".to_string(),
            template: "Given the intake answers {{data}}, list the most likely potential \
                       causes as JSON: {\"data\":{\"items\":[{\"name\":...,\"summary\":...}]}}"
                .to_string(),
            extraction_path: "data.items".to_string(),
            default_mode: StreamingMode::Structured,
            required_keys: vec!["name".to_string(), "summary".to_string()],
            min_string_len: 3,
        },
        PromptSpec {
            feature: "health_concern".to_string(),
            step: "recommendations".to_string(),
            template: "Given the selected causes {{data}}, recommend next steps as JSON: \
                       {\"data\":{\"items\":[{\"name\":...,\"summary\":...}]}}"
                .to_string(),
            extraction_path: "data.items".to_string(),
            default_mode: StreamingMode::Hybrid,
            required_keys: vec!["name".to_string()],
            min_string_len: 3,
        },
    ]
});

/// Registry of prompt specs, keyed by `(feature, step)`
#[derive(Debug, Clone, Default)]
pub struct PromptRegistry {
    entries: HashMap<(String, String), PromptSpec>,
}

impl PromptRegistry {
    /// Empty registry, for tests that register their own entries
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry seeded with the built-in wizard steps
    pub fn builtin() -> Self {
        let mut registry = Self::default();
        for spec in BUILTIN_SPECS.iter() {
            registry.register(spec.clone());
        }
        registry
    }

    /// Add or replace an entry. Later registrations win.
    pub fn register(&mut self, spec: PromptSpec) {
        self.entries
            .insert((spec.feature.clone(), spec.step.clone()), spec);
    }

    pub fn get(&self, feature: &str, step: &str) -> Option<&PromptSpec> {
        self.entries
            .get(&(feature.to_string(), step.to_string()))
    }

    /// Resolve or fail with a not-found error naming the selector.
    pub fn resolve(&self, feature: &str, step: &str) -> Result<&PromptSpec> {
        self.get(feature, step).ok_or_else(|| {
            Error::NotFound(format!("no prompt registered for {feature}/{step}"))
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
