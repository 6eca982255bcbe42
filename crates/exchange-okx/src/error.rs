//! Error types for the OKX integration.

use position_guard_core::Retryable;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OkxError {
    /// HMAC setup failed.
    #[error("signing error: {0}")]
    Signing(String),

    /// Transport failure before a response arrived.
    #[error("network error: {0}")]
    Network(String),

    /// Non-success HTTP status.
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body.
        message: String,
    },

    /// HTTP 429.
    #[error("rate limit exceeded")]
    RateLimited,

    /// HTTP 200 with a non-zero venue code.
    #[error("exchange error {code}: {message}")]
    Exchange {
        /// Venue error code.
        code: String,
        /// Venue error message.
        message: String,
    },

    #[error("parse error: {0}")]
    Parse(String),

    /// Failed to establish a websocket connection.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

impl OkxError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        if status == 429 {
            Self::RateLimited
        } else {
            Self::Api {
                status,
                message: message.into(),
            }
        }
    }
}

impl Retryable for OkxError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::RateLimited | Self::Api { status: 500..=599, .. }
        )
    }
}

impl From<reqwest::Error> for OkxError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Parse(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for OkxError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_retryable_statuses() {
        assert!(OkxError::api(429, "").is_retryable());
        assert!(OkxError::api(500, "").is_retryable());
        assert!(!OkxError::api(401, "").is_retryable());
        assert!(!OkxError::Exchange {
            code: "51000".to_string(),
            message: "bad param".to_string()
        }
        .is_retryable());
    }
}
