//! Configuration for the streaming pipeline server

use crate::error::{Error, Result};
use crate::mode::StreamingMode;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Get the global trickle directory for configuration and data
pub fn get_global_trickle_dir() -> Result<PathBuf> {
    ProjectDirs::from("com", "trickle", "trickle")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
}

/// Bind address for the HTTP server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

/// Upstream token producer connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Completion endpoint the HTTP producer posts payloads to
    pub endpoint: String,
    /// Bearer token; left unset for local producers
    pub api_key: Option<String>,
    /// Connection attempts before the first event is emitted
    pub max_connect_retries: u32,
    /// Base delay for exponential backoff between attempts
    pub retry_delay_ms: u64,
    /// No upstream batch within this window is treated as upstream failure
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8600/v1/complete".to_string(),
            api_key: None,
            max_connect_retries: 3,
            retry_delay_ms: 500,
            idle_timeout: Duration::from_secs(30),
        }
    }
}

/// Defaults applied to every streaming session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Mode used when neither request nor prompt spec names one
    pub default_mode: StreamingMode,
    /// Bound of the per-session event channel; when the transport cannot
    /// drain, the orchestrator suspends instead of buffering further
    pub channel_capacity: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            default_mode: StreamingMode::Structured,
            channel_capacity: 32,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file. Without an explicit path, the
    /// global trickle directory is checked before falling back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        if let Ok(dir) = get_global_trickle_dir() {
            let global = dir.join("trickle.toml");
            if global.exists() {
                return Self::from_file(&global);
            }
        }
        Ok(Self::default())
    }

    fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config = toml::from_str(&raw)?;
        Ok(config)
    }
}
