//! Error types for the store and trade-execution clients.

use position_guard_core::Retryable;
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection could not be established; nothing was sent.
    #[error("connection error: {0}")]
    Connect(String),

    /// Transport failure after the request may have been sent.
    #[error("network error: {0}")]
    Network(String),

    /// Non-success HTTP status.
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// HTTP 429.
    #[error("rate limit exceeded: {0}")]
    RateLimited(String),

    /// Response body did not match the expected shape.
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl StoreError {
    /// Maps a non-success status to an error.
    pub fn from_status(status: StatusCode, body: impl Into<String>) -> Self {
        let message = body.into();
        if status == StatusCode::TOO_MANY_REQUESTS {
            Self::RateLimited(message)
        } else {
            Self::Api {
                status: status.as_u16(),
                message,
            }
        }
    }

    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::RateLimited(_) => Some(429),
            _ => None,
        }
    }
}

impl Retryable for StoreError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connect(_)
                | Self::Network(_)
                | Self::RateLimited(_)
                | Self::Api { status: 500..=599, .. }
        )
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Serialization(e.to_string())
        } else if e.is_builder() {
            Self::Configuration(e.to_string())
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
