//! In-memory collaborators for unit tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use position_guard_core::{
    ApiCredentials, AuditRecord, AuditSink, CandleDirection, CredentialSource, MarginMode,
    MarketSnapshotSource, PositionSnapshot, StrategyConfig, StrategySource, StrategyStatus,
    TradeExecutor, TradeRequest,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::time::Instant;

pub fn strategy(id: &str, symbol: &str) -> StrategyConfig {
    StrategyConfig {
        id: id.to_string(),
        account_id: "acc-1".to_string(),
        symbol: symbol.to_string(),
        status: StrategyStatus::Running,
        profit_ratio: 0.05,
        loss_stop_ratio: 0.1,
        margin_mode: MarginMode::Isolated,
        range_low: None,
        range_high: None,
        entry_size: None,
        auto_restart_on_price_return: false,
        signal_type: None,
    }
}

#[derive(Default)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<(Instant, TradeRequest)>>,
    fail_action: Option<&'static str>,
}

impl RecordingExecutor {
    pub fn failing(action: &'static str) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_action: Some(action),
        }
    }

    pub fn calls(&self) -> Vec<(Instant, TradeRequest)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TradeExecutor for RecordingExecutor {
    async fn execute(&self, request: &TradeRequest) -> Result<Value> {
        self.calls
            .lock()
            .unwrap()
            .push((Instant::now(), request.clone()));
        if self.fail_action == Some(request.action()) {
            return Err(anyhow!("API error: 400 - rejected"));
        }
        Ok(json!({ "ok": true }))
    }
}

#[derive(Default)]
pub struct RecordingSink {
    records: Mutex<Vec<AuditRecord>>,
    fail: bool,
}

impl RecordingSink {
    pub fn failing() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditSink for RecordingSink {
    async fn record(&self, record: AuditRecord) -> Result<()> {
        if self.fail {
            return Err(anyhow!("log sink unavailable"));
        }
        self.records.lock().unwrap().push(record);
        Ok(())
    }
}

/// Credentials and strategies keyed by account id.
#[derive(Default)]
pub struct StaticStore {
    pub credentials: HashMap<String, (String, String, String)>,
    pub strategies: Mutex<HashMap<String, Vec<StrategyConfig>>>,
}

impl StaticStore {
    pub fn with_account(account_id: &str, strategies: Vec<StrategyConfig>) -> Self {
        let mut credentials = HashMap::new();
        credentials.insert(
            account_id.to_string(),
            ("key".to_string(), "secret".to_string(), "phrase".to_string()),
        );
        let mut by_account = HashMap::new();
        by_account.insert(account_id.to_string(), strategies);
        Self {
            credentials,
            strategies: Mutex::new(by_account),
        }
    }

    pub fn set_strategies(&self, account_id: &str, strategies: Vec<StrategyConfig>) {
        self.strategies
            .lock()
            .unwrap()
            .insert(account_id.to_string(), strategies);
    }
}

#[async_trait]
impl CredentialSource for StaticStore {
    async fn load_credentials(&self, account_id: &str) -> Result<Option<ApiCredentials>> {
        Ok(self
            .credentials
            .get(account_id)
            .map(|(key, secret, phrase)| ApiCredentials::new(account_id, key, secret, phrase)))
    }
}

#[async_trait]
impl StrategySource for StaticStore {
    async fn load_strategies(&self, account_id: &str) -> Result<Vec<StrategyConfig>> {
        Ok(self
            .strategies
            .lock()
            .unwrap()
            .get(account_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Market reads served from fixed maps keyed by instrument id.
#[derive(Default)]
pub struct StaticMarket {
    pub positions: HashMap<String, Vec<PositionSnapshot>>,
    pub directions: HashMap<String, CandleDirection>,
    pub prices: HashMap<String, Decimal>,
    pub failing: Vec<String>,
}

impl StaticMarket {
    fn check(&self, inst_id: &str) -> Result<()> {
        if self.failing.iter().any(|failing| failing == inst_id) {
            return Err(anyhow!("network error: {inst_id} unreachable"));
        }
        Ok(())
    }
}

#[async_trait]
impl MarketSnapshotSource for StaticMarket {
    async fn positions(
        &self,
        _credentials: &ApiCredentials,
        inst_id: &str,
    ) -> Result<Vec<PositionSnapshot>> {
        self.check(inst_id)?;
        Ok(self.positions.get(inst_id).cloned().unwrap_or_default())
    }

    async fn candle_direction(&self, inst_id: &str) -> Result<Option<CandleDirection>> {
        self.check(inst_id)?;
        Ok(self.directions.get(inst_id).copied())
    }

    async fn last_price(&self, inst_id: &str) -> Result<Option<Decimal>> {
        self.check(inst_id)?;
        Ok(self.prices.get(inst_id).copied())
    }
}
