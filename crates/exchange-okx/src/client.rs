//! Signed and public REST reads used by tick evaluation.

use async_trait::async_trait;
use chrono::Utc;
use governor::{
    clock::DefaultClock,
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use position_guard_core::{
    retry_with_backoff, ApiCredentials, CandleDirection, MarketSnapshotSource, OkxConfig,
    PositionSnapshot, RetryPolicy,
};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::auth;
use crate::error::OkxError;
use crate::messages::{parse_candle, PositionRow};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

type GovernorLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// `{"code": "0", "msg": "", "data": [...]}` envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct TickerRow {
    #[serde(default)]
    last: String,
}

/// REST client for positions, the latest candle and the last traded price.
#[derive(Clone)]
pub struct OkxRestClient {
    http: Client,
    base_url: String,
    inst_type: String,
    candle_bar: String,
    limiter: Arc<GovernorLimiter>,
    retry: RetryPolicy,
}

impl OkxRestClient {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &OkxConfig, retry: RetryPolicy) -> Result<Self, OkxError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| OkxError::Network(e.to_string()))?;
        let rps = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        Ok(Self {
            http,
            base_url: config.rest_url.trim_end_matches('/').to_string(),
            inst_type: config.inst_type.clone(),
            candle_bar: config.candle_bar.clone(),
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(rps))),
            retry,
        })
    }

    /// Open positions for one instrument, normalised. Flat rows are dropped.
    ///
    /// # Errors
    /// Returns an error on transport failure, a non-success status or a
    /// non-zero venue code.
    pub async fn fetch_positions(
        &self,
        credentials: &ApiCredentials,
        inst_id: &str,
    ) -> Result<Vec<PositionSnapshot>, OkxError> {
        let request_path = format!(
            "/api/v5/account/positions?instType={}&instId={inst_id}",
            self.inst_type
        );
        let rows: Vec<PositionRow> = self.get(&request_path, Some(credentials)).await?;
        Ok(rows
            .into_iter()
            .filter_map(PositionRow::into_snapshot)
            .filter(|snapshot| !snapshot.is_flat())
            .collect())
    }

    /// Direction of the newest candle, or `None` when the venue returns none.
    ///
    /// # Errors
    /// Returns an error on transport failure or a venue error.
    pub async fn fetch_candle_direction(
        &self,
        inst_id: &str,
    ) -> Result<Option<CandleDirection>, OkxError> {
        let request_path = format!(
            "/api/v5/market/candles?instId={inst_id}&bar={}&limit=1",
            self.candle_bar
        );
        let rows: Vec<Value> = self.get(&request_path, None).await?;
        Ok(rows
            .first()
            .and_then(|row| parse_candle(inst_id, row))
            .map(|candle| candle.direction()))
    }

    /// # Errors
    /// Returns an error on transport failure or a venue error.
    pub async fn fetch_last_price(&self, inst_id: &str) -> Result<Option<Decimal>, OkxError> {
        let request_path = format!("/api/v5/market/ticker?instId={inst_id}");
        let rows: Vec<TickerRow> = self.get(&request_path, None).await?;
        Ok(rows
            .first()
            .and_then(|row| Decimal::from_str(&row.last).ok()))
    }

    async fn get<T: DeserializeOwned>(
        &self,
        request_path: &str,
        credentials: Option<&ApiCredentials>,
    ) -> Result<Vec<T>, OkxError> {
        retry_with_backoff(&self.retry, request_path, || async {
            self.limiter.until_ready().await;

            let mut request = self.http.get(format!("{}{request_path}", self.base_url));
            if let Some(credentials) = credentials {
                let timestamp = auth::rest_timestamp(Utc::now());
                let signature = auth::rest_signature(
                    credentials.secret(),
                    &timestamp,
                    "GET",
                    request_path,
                    "",
                )?;
                request = request
                    .header("OK-ACCESS-KEY", &credentials.api_key)
                    .header("OK-ACCESS-SIGN", signature)
                    .header("OK-ACCESS-TIMESTAMP", timestamp)
                    .header("OK-ACCESS-PASSPHRASE", credentials.passphrase());
            }

            let response = request.send().await?;
            let status = response.status();
            let body = response.text().await?;
            if !status.is_success() {
                return Err(OkxError::api(status.as_u16(), body));
            }

            let envelope: Envelope<T> = serde_json::from_str(&body)?;
            if envelope.code != "0" {
                return Err(OkxError::Exchange {
                    code: envelope.code,
                    message: envelope.msg,
                });
            }
            debug!(path = request_path, rows = envelope.data.len(), "OKX request ok");
            Ok(envelope.data)
        })
        .await
    }
}

#[async_trait]
impl MarketSnapshotSource for OkxRestClient {
    async fn positions(
        &self,
        credentials: &ApiCredentials,
        inst_id: &str,
    ) -> anyhow::Result<Vec<PositionSnapshot>> {
        Ok(self.fetch_positions(credentials, inst_id).await?)
    }

    async fn candle_direction(&self, inst_id: &str) -> anyhow::Result<Option<CandleDirection>> {
        Ok(self.fetch_candle_direction(inst_id).await?)
    }

    async fn last_price(&self, inst_id: &str) -> anyhow::Result<Option<Decimal>> {
        Ok(self.fetch_last_price(inst_id).await?)
    }
}
