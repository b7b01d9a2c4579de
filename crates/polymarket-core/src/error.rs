//! Error types for the insider-activity scanner system.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("indexer unavailable: {0}")]
    IndexerUnavailable(String),

    #[error("rate limited by indexer")]
    RateLimited { retry_after: Option<Duration> },

    #[error("query rejected: {0}")]
    Query(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether the indexer client should retry the request that produced
    /// this error. Malformed queries and responses never recover on retry;
    /// transport failures, timeouts, and indexer-side unavailability do.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Http(_)
                | Error::Timeout(_)
                | Error::IndexerUnavailable(_)
                | Error::RateLimited { .. }
        )
    }

    /// Server-supplied cooldown hint, when the indexer sent one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
