use anyhow::{Context, Result};
use position_guard_core::{
    AppConfig, AuditSink, CredentialSource, EngineConfig, MarketSnapshotSource, OkxConfig,
    StrategySource, TradeExecutor,
};
use position_guard_data::{ExecutionClient, RestStore};
use position_guard_okx::OkxRestClient;
use std::sync::Arc;
use std::time::Duration;

/// Collaborators and settings shared by every account actor.
#[derive(Clone)]
pub struct AccountDeps {
    pub credentials: Arc<dyn CredentialSource>,
    pub strategies: Arc<dyn StrategySource>,
    pub audit: Arc<dyn AuditSink>,
    pub executor: Arc<dyn TradeExecutor>,
    pub market: Arc<dyn MarketSnapshotSource>,
    pub okx: OkxConfig,
    pub engine: EngineConfig,
    pub refresh_interval: Duration,
}

impl AccountDeps {
    /// Wires the REST store, the trade endpoint client and the OKX REST client.
    ///
    /// # Errors
    /// Returns an error if any HTTP client cannot be built.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let store = Arc::new(
            RestStore::new(config.store.clone(), config.retry.clone())
                .context("Failed to build strategy store client")?,
        );
        let executor = Arc::new(
            ExecutionClient::new(&config.store, config.retry.clone())
                .context("Failed to build trade endpoint client")?,
        );
        let market = Arc::new(
            OkxRestClient::new(&config.okx, config.retry.clone())
                .context("Failed to build OKX REST client")?,
        );

        Ok(Self {
            credentials: store.clone(),
            strategies: store.clone(),
            audit: store,
            executor,
            market,
            okx: config.okx.clone(),
            engine: config.engine.clone(),
            refresh_interval: config.store.refresh_interval(),
        })
    }
}
