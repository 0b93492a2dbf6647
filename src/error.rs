//! Error types for Ultrahuman Flux

use thiserror::Error;

/// Errors that can occur when handling payloads outside the extraction core
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Failed to parse payload: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Date parse error: {0}")]
    DateParseError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),
}

/// Failures of a single fetch against the daily metrics endpoint.
///
/// A missing day (HTTP 404) is not represented here: the fetcher reports it as
/// an empty result.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid API token")]
    Auth,

    #[error("API token lacks required permissions")]
    Permission,

    #[error("Ultrahuman API server error: {0}")]
    Server(u16),

    #[error("Unexpected response status: {0}")]
    UnexpectedStatus(u16),

    #[error("Error communicating with API: {0}")]
    Transport(String),

    #[error("Malformed response body: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Whether the failure needs operator attention (bad or under-scoped token)
    /// rather than simply waiting for the next tick.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FetchError::Auth | FetchError::Permission)
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            FetchError::Malformed(e.to_string())
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}
