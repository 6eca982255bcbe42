use async_trait::async_trait;
use position_guard_core::{
    retry_with_backoff, RetryPolicy, Retryable, StoreConfig, TradeExecutor, TradeRequest,
};
use reqwest::Client;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Result, StoreError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Client for the external trade-execution endpoint.
///
/// The endpoint owns order placement on the venue; this client only forwards
/// `placeOrder` and `closePosition` requests and reports the response body.
/// Trade submissions are not idempotent: a request that may have reached the
/// endpoint is never sent again. Only rate limits, 5xx responses and failed
/// connects are retried.
struct SubmitError(StoreError);

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl Retryable for SubmitError {
    fn is_retryable(&self) -> bool {
        matches!(
            self.0,
            StoreError::Connect(_)
                | StoreError::RateLimited(_)
                | StoreError::Api { status: 500..=599, .. }
        )
    }
}

#[derive(Clone)]
pub struct ExecutionClient {
    http: Client,
    endpoint: String,
    service_key: String,
    retry: RetryPolicy,
}

impl ExecutionClient {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &StoreConfig, retry: RetryPolicy) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StoreError::Configuration(e.to_string()))?;
        let endpoint = format!(
            "{}/{}",
            config.url.trim_end_matches('/'),
            config.trade_endpoint.trim_start_matches('/')
        );
        Ok(Self {
            http,
            endpoint,
            service_key: config.service_key.clone(),
            retry,
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Posts one trade request, retrying 429 and 5xx responses.
    ///
    /// # Errors
    /// Returns the last error once retries are exhausted, or immediately for
    /// any other non-success status or a transport failure after connecting.
    pub async fn submit(&self, request: &TradeRequest) -> Result<Value> {
        debug!(action = request.action(), symbol = request.symbol(), "Submitting trade request");
        let response = retry_with_backoff(&self.retry, request.action(), || async {
            let response = self
                .http
                .post(&self.endpoint)
                .bearer_auth(&self.service_key)
                .json(request)
                .send()
                .await
                .map_err(|e| SubmitError(e.into()))?;
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if !status.is_success() {
                return Err(SubmitError(StoreError::from_status(status, body)));
            }
            Ok(serde_json::from_str(&body).unwrap_or(Value::Null))
        })
        .await
        .map_err(|SubmitError(e)| e)?;
        info!(action = request.action(), symbol = request.symbol(), "Trade request accepted");
        Ok(response)
    }
}

#[async_trait]
impl TradeExecutor for ExecutionClient {
    async fn execute(&self, request: &TradeRequest) -> anyhow::Result<Value> {
        Ok(self.submit(request).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use position_guard_core::{ClosePosition, MarginMode, PosSide};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ExecutionClient {
        let config = StoreConfig {
            url: server.uri(),
            service_key: "svc".to_string(),
            ..StoreConfig::default()
        };
        let retry = RetryPolicy {
            max_retries: 3,
            base_delay_ms: 1,
            max_delay_ms: 4,
            jitter_ms: 1,
        };
        ExecutionClient::new(&config, retry).unwrap()
    }

    fn close_request() -> TradeRequest {
        TradeRequest::ClosePosition(ClosePosition {
            strategy_id: Some("s1".to_string()),
            symbol: "BTC/USDT:USDT".to_string(),
            pos_side: PosSide::Long,
            margin_mode: MarginMode::Isolated,
            credential_id: "acc-1".to_string(),
        })
    }

    #[tokio::test]
    async fn posts_action_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/functions/v1/okx-trading"))
            .and(header("authorization", "Bearer svc"))
            .and(body_partial_json(json!({
                "action": "closePosition",
                "data": {"symbol": "BTC/USDT:USDT", "posSide": "long"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let body = client(&server).submit(&close_request()).await.unwrap();
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn retries_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/functions/v1/okx-trading"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/functions/v1/okx-trading"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        assert!(client(&server).submit(&close_request()).await.is_ok());
    }

    #[tokio::test]
    async fn exhausted_retries_surface_last_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/functions/v1/okx-trading"))
            .respond_with(ResponseTemplate::new(502))
            .expect(4)
            .mount(&server)
            .await;

        let err = client(&server).submit(&close_request()).await.unwrap_err();
        assert_eq!(err.status(), Some(502));
    }

    #[tokio::test]
    async fn bad_request_fails_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/functions/v1/okx-trading"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad symbol"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server).submit(&close_request()).await.unwrap_err();
        assert_eq!(err.to_string(), "API error: 400 - bad symbol");
    }

    #[tokio::test]
    async fn non_json_success_body_is_null() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/functions/v1/okx-trading"))
            .respond_with(ResponseTemplate::new(200).set_body_string("accepted"))
            .mount(&server)
            .await;

        let body = client(&server).submit(&close_request()).await.unwrap();
        assert!(body.is_null());
    }

    fn client_for(url: String) -> ExecutionClient {
        let config = StoreConfig {
            url,
            service_key: "svc".to_string(),
            ..StoreConfig::default()
        };
        let retry = RetryPolicy {
            max_retries: 4,
            base_delay_ms: 1,
            max_delay_ms: 4,
            jitter_ms: 1,
        };
        ExecutionClient::new(&config, retry).unwrap()
    }

    #[tokio::test]
    async fn dropped_response_is_not_resubmitted() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(AtomicUsize::new(0));
        let counter = received.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = vec![0u8; 8192];
                if matches!(socket.read(&mut buf).await, Ok(n) if n > 0) {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
                drop(socket);
            }
        });

        let err = client_for(format!("http://{addr}"))
            .submit(&close_request())
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Network(_)), "got {err:?}");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(received.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refused_connection_is_retried() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client_for(format!("http://{addr}"))
            .submit(&close_request())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Connect(_)), "got {err:?}");
        assert!(SubmitError(err).is_retryable());
    }

    #[test]
    fn submissions_only_retry_when_nothing_was_processed() {
        assert!(SubmitError(StoreError::RateLimited(String::new())).is_retryable());
        assert!(SubmitError(StoreError::Api {
            status: 503,
            message: String::new()
        })
        .is_retryable());
        assert!(!SubmitError(StoreError::Network("reset".to_string())).is_retryable());
        assert!(!SubmitError(StoreError::Api {
            status: 409,
            message: String::new()
        })
        .is_retryable());
    }
}
