//! Row shapes returned by the store's REST interface.

use position_guard_core::{
    ApiCredentials, MarginMode, RatioUnit, StrategyConfig, StrategyStatus,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::warn;

/// Columns selected from the strategies table.
pub const STRATEGY_COLUMNS: &str = "id,api_credential_id,symbol,status,profit_ratio,loss_stop_ratio,margin_mode,signal_type,range_low,range_high,auto_restart_on_price_return,entry_size";

#[derive(Debug, Deserialize)]
pub struct CredentialRow {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub api_key: String,
    pub api_secret: String,
    pub passphrase: String,
}

impl From<CredentialRow> for ApiCredentials {
    fn from(row: CredentialRow) -> Self {
        Self::new(row.id, row.api_key, row.api_secret, row.passphrase)
    }
}

#[derive(Debug, Deserialize)]
pub struct StrategyRow {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub api_credential_id: String,
    pub symbol: String,
    pub status: String,
    #[serde(default)]
    pub profit_ratio: Option<f64>,
    #[serde(default)]
    pub loss_stop_ratio: Option<f64>,
    #[serde(default)]
    pub margin_mode: Option<MarginMode>,
    #[serde(default)]
    pub signal_type: Option<String>,
    #[serde(default)]
    pub range_low: Option<f64>,
    #[serde(default)]
    pub range_high: Option<f64>,
    #[serde(default)]
    pub auto_restart_on_price_return: Option<bool>,
    #[serde(default)]
    pub entry_size: Option<f64>,
}

impl StrategyRow {
    /// Converts a row into engine form, scaling ratios by `unit`.
    ///
    /// Rows whose status is neither running nor paused yield `None`, as do
    /// rows without a profit ratio.
    #[must_use]
    pub fn into_config(self, unit: RatioUnit) -> Option<StrategyConfig> {
        let status = match self.status.as_str() {
            "running" => StrategyStatus::Running,
            "paused" => StrategyStatus::Paused,
            _ => return None,
        };
        let Some(profit_ratio) = self.profit_ratio else {
            warn!(strategy_id = %self.id, symbol = %self.symbol, "Strategy has no profit ratio, skipping");
            return None;
        };

        Some(StrategyConfig {
            id: self.id,
            account_id: self.api_credential_id,
            symbol: self.symbol,
            status,
            profit_ratio: unit.to_fraction(profit_ratio),
            loss_stop_ratio: unit.to_fraction(self.loss_stop_ratio.unwrap_or(0.0).abs()),
            margin_mode: self.margin_mode.unwrap_or_default(),
            range_low: self.range_low.and_then(to_decimal),
            range_high: self.range_high.and_then(to_decimal),
            entry_size: self.entry_size.and_then(to_decimal),
            auto_restart_on_price_return: self.auto_restart_on_price_return.unwrap_or(false),
            signal_type: self.signal_type,
        })
    }
}

fn to_decimal(value: f64) -> Option<Decimal> {
    Decimal::try_from(value).ok()
}

/// Store ids are uuids in some deployments and integers in others.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}
