use position_guard_core::{retry_with_backoff, RetryPolicy};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, StoreError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts feed events to a remote account's `/events` endpoint.
#[derive(Clone)]
pub struct EventForwarder {
    http: Client,
    endpoint: String,
    bearer: Option<String>,
    retry: RetryPolicy,
}

impl EventForwarder {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>, bearer: Option<String>, retry: RetryPolicy) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StoreError::Configuration(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            bearer,
            retry,
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Posts `body` as JSON, retrying 429, 5xx and transport failures.
    ///
    /// # Errors
    /// Returns the last error once retries are exhausted, or immediately for
    /// any other non-success status.
    pub async fn forward<T: Serialize + ?Sized>(&self, body: &T) -> Result<()> {
        retry_with_backoff(&self.retry, "forward events", || async {
            let mut request = self.http.post(&self.endpoint).json(body);
            if let Some(token) = &self.bearer {
                request = request.bearer_auth(token);
            }
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(StoreError::from_status(status, text));
            }
            Ok(())
        })
        .await?;
        debug!(endpoint = %self.endpoint, "Events forwarded");
        Ok(())
    }
}
