use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub okx: OkxConfig,
    pub engine: EngineConfig,
    pub retry: RetryPolicy,
    /// Accounts started automatically by `serve`.
    pub accounts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Unit of the ratio columns in the strategy store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RatioUnit {
    /// Whole-number percentages, `5` means 5 %.
    #[default]
    Percent,
    /// Already fractions, `0.05` means 5 %.
    Fraction,
}

impl RatioUnit {
    #[must_use]
    pub fn to_fraction(self, value: f64) -> f64 {
        match self {
            Self::Percent => value / 100.0,
            Self::Fraction => value,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Base URL of the store, e.g. `https://project.supabase.co`.
    pub url: String,
    pub service_key: String,
    pub ratio_unit: RatioUnit,
    pub refresh_interval_secs: u64,
    pub credentials_table: String,
    pub strategies_table: String,
    pub logs_table: String,
    /// Path of the trade-execution endpoint relative to `url`.
    pub trade_endpoint: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:54321".to_string(),
            service_key: String::new(),
            ratio_unit: RatioUnit::Percent,
            refresh_interval_secs: 60,
            credentials_table: "okx_api_credentials".to_string(),
            strategies_table: "strategies".to_string(),
            logs_table: "strategy_logs".to_string(),
            trade_endpoint: "/functions/v1/okx-trading".to_string(),
        }
    }
}

impl StoreConfig {
    #[must_use]
    pub const fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("url", &self.url)
            .field("service_key", &"[REDACTED]")
            .field("ratio_unit", &self.ratio_unit)
            .field("refresh_interval_secs", &self.refresh_interval_secs)
            .field("credentials_table", &self.credentials_table)
            .field("strategies_table", &self.strategies_table)
            .field("logs_table", &self.logs_table)
            .field("trade_endpoint", &self.trade_endpoint)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OkxConfig {
    pub rest_url: String,
    pub ws_private_url: String,
    pub ws_public_url: String,
    pub inst_type: String,
    /// Candle bar for the direction feed; the channel is `candle{bar}`.
    pub candle_bar: String,
    pub heartbeat_ms: u64,
    pub reconnect_delay_ms: u64,
    pub requests_per_second: u32,
}

impl Default for OkxConfig {
    fn default() -> Self {
        Self {
            rest_url: "https://www.okx.com".to_string(),
            ws_private_url: "wss://ws.okx.com:8443/ws/v5/private".to_string(),
            ws_public_url: "wss://ws.okx.com:8443/ws/v5/public".to_string(),
            inst_type: "SWAP".to_string(),
            candle_bar: "1H".to_string(),
            heartbeat_ms: 20_000,
            reconnect_delay_ms: 2_000,
            requests_per_second: 10,
        }
    }
}

impl OkxConfig {
    #[must_use]
    pub fn candle_channel(&self) -> String {
        format!("candle{}", self.candle_bar)
    }

    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    #[must_use]
    pub const fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// Evaluation and dispatch timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub debounce_ms: u64,
    pub hedge_delay_ms: u64,
    pub close_jitter_min_ms: u64,
    pub close_jitter_max_ms: u64,
    pub reentry_delay_ms: u64,
    /// Open from flat during tick evaluation when `entry_size` is set.
    pub tick_bootstrap: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 2_000,
            hedge_delay_ms: 5_000,
            close_jitter_min_ms: 500,
            close_jitter_max_ms: 2_500,
            reentry_delay_ms: 7_000,
            tick_bootstrap: true,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub const fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}
