use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Upstream timed out: {0}")]
    Timeout(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Session canceled: {0}")]
    Canceled(String),

    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),

    #[error("Other error: {0}")]
    Other(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable code carried in terminal `error` wire frames.
    pub fn wire_code(&self) -> &'static str {
        match self {
            Error::Upstream(_) => "upstream_error",
            Error::Timeout(_) => "upstream_timeout",
            Error::Protocol(_) => "protocol_error",
            Error::Parse(_) | Error::Serialization(_) => "parse_error",
            Error::Validation(_) => "validation_error",
            Error::NotFound(_) => "not_found",
            Error::Canceled(_) => "canceled",
            Error::Request(_) | Error::Io(_) => "transport_error",
            _ => "internal_error",
        }
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
