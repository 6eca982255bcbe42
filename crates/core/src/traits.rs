use crate::audit::AuditRecord;
use crate::trade::TradeRequest;
use crate::types::{ApiCredentials, CandleDirection, PositionSnapshot, StrategyConfig};
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Returns `None` when the account has no stored credentials.
    async fn load_credentials(&self, account_id: &str) -> Result<Option<ApiCredentials>>;
}

#[async_trait]
pub trait StrategySource: Send + Sync {
    /// Running and paused strategies of an account, ratios as fractions.
    async fn load_strategies(&self, account_id: &str) -> Result<Vec<StrategyConfig>>;
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: AuditRecord) -> Result<()>;
}

#[async_trait]
pub trait TradeExecutor: Send + Sync {
    async fn execute(&self, request: &TradeRequest) -> Result<serde_json::Value>;
}

/// Pull-based market access used by tick evaluation.
#[async_trait]
pub trait MarketSnapshotSource: Send + Sync {
    /// Open positions for one instrument. An empty list means flat.
    async fn positions(
        &self,
        credentials: &ApiCredentials,
        inst_id: &str,
    ) -> Result<Vec<PositionSnapshot>>;

    async fn candle_direction(&self, inst_id: &str) -> Result<Option<CandleDirection>>;

    async fn last_price(&self, inst_id: &str) -> Result<Option<Decimal>>;
}
