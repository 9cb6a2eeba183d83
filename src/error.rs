use std::time::Duration;
use thiserror::Error;

/// Rejected seed input. The only error class `analyze()` surfaces to callers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("URL is empty")]
    Empty,
    #[error("Invalid URL '{input}': {reason}")]
    Unparseable { input: String, reason: String },
    #[error("URL must use HTTP or HTTPS protocol, got '{0}'")]
    UnsupportedScheme(String),
    #[error("URL '{0}' has no hostname")]
    MissingHost(String),
}

/// Per-page acquisition failure. The crawler records these and moves on.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("request failed: {0}")]
    Transport(String),
    #[error("HTTP {status} with no renderable body")]
    Status { status: u16 },
    #[error("failed to read response body: {0}")]
    Body(String),
    #[error("too many redirects (more than {0})")]
    TooManyRedirects(usize),
    #[error("browser rendering failed: {0}")]
    Render(String),
}

impl FetchError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        FetchError::Transport(e.to_string())
    }
}

/// Internal failure inside a sub-scorer. Absorbed by the scoring engine.
#[derive(Debug, Clone, Error)]
pub enum ScoringError {
    #[error("{dimension} scorer failed: {reason}")]
    Dimension { dimension: String, reason: String },
    #[error("{dimension} scorer panicked")]
    Panicked { dimension: String },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{field} = {value} is outside 0..={max}")]
    OutOfRange { field: String, value: u32, max: u32 },
    #[error("page {0} not found")]
    PageNotFound(uuid::Uuid),
    #[error("invalid highlight {id}: {reason}")]
    InvalidHighlight { id: String, reason: String },
}
