//! Error types for weatherhub

use http::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Wire Errors ===
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Operation timeout: {0}")]
    Timeout(String),

    // === Store Errors ===
    #[error("Station not found: {0}")]
    NotFound(String),

    #[error("Persist snapshot failed: {0}")]
    Persistence(String),

    #[error("Restore snapshot failed: {0}")]
    Restore(String),

    // === Content Errors ===
    #[error("Ingest failed: {0}")]
    Ingest(String),

    // === Config Errors ===
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Generic ===
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Is this a failure the sending side may retry?
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::Connection(_) | Error::Timeout(_) | Error::Protocol(_)
        )
    }

    /// Wire status reported for this error.
    ///
    /// A read miss shares the generic server-error status with every other
    /// server-side failure; clients rely on that code.
    pub fn to_status(&self) -> StatusCode {
        match self {
            Error::Protocol(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(e.to_string())
        } else {
            Error::Connection(e.to_string())
        }
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}
