//! REST client for the credential and strategy store.
//!
//! The store speaks the PostgREST dialect: tables live under `/rest/v1/`,
//! filters are query parameters such as `id=eq.abc`, and every request carries
//! the service key both as `apikey` and as a bearer token.

use async_trait::async_trait;
use position_guard_core::{
    retry_with_backoff, ApiCredentials, AuditRecord, AuditSink, CredentialSource, RatioUnit,
    RetryPolicy, StoreConfig, StrategyConfig, StrategySource,
};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Result, StoreError};
use crate::rows::{CredentialRow, StrategyRow, STRATEGY_COLUMNS};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone)]
pub struct RestStore {
    http: Client,
    config: StoreConfig,
    retry: RetryPolicy,
}

impl RestStore {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: StoreConfig, retry: RetryPolicy) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StoreError::Configuration(e.to_string()))?;
        Ok(Self {
            http,
            config,
            retry,
        })
    }

    #[must_use]
    pub const fn ratio_unit(&self) -> RatioUnit {
        self.config.ratio_unit
    }

    /// Fetches the credentials row for an account.
    ///
    /// # Errors
    /// Returns an error if the request fails after retries or the row is malformed.
    pub async fn fetch_credentials(&self, account_id: &str) -> Result<Option<ApiCredentials>> {
        let url = self.table_url(&self.config.credentials_table);
        let query = [
            ("id", format!("eq.{account_id}")),
            ("select", "*".to_string()),
            ("limit", "1".to_string()),
        ];
        let rows: Vec<CredentialRow> = self.get_json(&url, &query).await?;
        Ok(rows.into_iter().next().map(ApiCredentials::from))
    }

    /// Fetches running and paused strategies for an account.
    ///
    /// # Errors
    /// Returns an error if the request fails after retries or the rows are malformed.
    pub async fn fetch_strategies(&self, account_id: &str) -> Result<Vec<StrategyConfig>> {
        let url = self.table_url(&self.config.strategies_table);
        let query = [
            ("api_credential_id", format!("eq.{account_id}")),
            ("status", "in.(running,paused)".to_string()),
            ("select", STRATEGY_COLUMNS.to_string()),
        ];
        let rows: Vec<StrategyRow> = self.get_json(&url, &query).await?;
        let unit = self.config.ratio_unit;
        let strategies: Vec<StrategyConfig> = rows
            .into_iter()
            .filter_map(|row| {
                let id = row.id.clone();
                let config = row.into_config(unit);
                if config.is_none() {
                    debug!(strategy_id = %id, "Skipping strategy with unsupported status");
                }
                config
            })
            .collect();
        debug!(account_id, count = strategies.len(), "Fetched strategies");
        Ok(strategies)
    }

    /// Appends one row to the strategy log.
    ///
    /// # Errors
    /// Returns an error if the insert fails after retries.
    pub async fn insert_log(&self, record: &AuditRecord) -> Result<()> {
        let url = self.table_url(&self.config.logs_table);
        retry_with_backoff(&self.retry, "insert_log", || async {
            let response = self
                .authorize(self.http.post(&url))
                .header("Prefer", "return=minimal")
                .json(record)
                .send()
                .await?;
            let status = response.status();
            if status.is_success() {
                Ok(())
            } else {
                let body = response.text().await.unwrap_or_default();
                Err(StoreError::from_status(status, body))
            }
        })
        .await
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.config.url.trim_end_matches('/'), table)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.config.service_key)
            .bearer_auth(&self.config.service_key)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        retry_with_backoff(&self.retry, url, || async {
            let response = self.authorize(self.http.get(url)).query(query).send().await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(StoreError::from_status(status, body));
            }
            let body = response.bytes().await?;
            Ok(serde_json::from_slice(&body)?)
        })
        .await
    }
}

#[async_trait]
impl CredentialSource for RestStore {
    async fn load_credentials(&self, account_id: &str) -> anyhow::Result<Option<ApiCredentials>> {
        Ok(self.fetch_credentials(account_id).await?)
    }
}

#[async_trait]
impl StrategySource for RestStore {
    async fn load_strategies(&self, account_id: &str) -> anyhow::Result<Vec<StrategyConfig>> {
        Ok(self.fetch_strategies(account_id).await?)
    }
}

/// Log writes are best effort: failures are reported and swallowed.
#[async_trait]
impl AuditSink for RestStore {
    async fn record(&self, record: AuditRecord) -> anyhow::Result<()> {
        if let Err(e) = self.insert_log(&record).await {
            warn!(error = %e, message = %record.message, "Failed to write strategy log");
        }
        Ok(())
    }
}
