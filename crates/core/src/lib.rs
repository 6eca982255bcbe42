pub mod audit;
pub mod config;
pub mod config_loader;
pub mod evaluator;
pub mod instrument;
pub mod market_state;
pub mod retry;
pub mod strategy_registry;
pub mod trade;
pub mod traits;
pub mod types;

pub use audit::{AuditLevel, AuditRecord};
pub use config::{AppConfig, EngineConfig, OkxConfig, RatioUnit, ServerConfig, StoreConfig};
pub use config_loader::ConfigLoader;
pub use evaluator::{DebounceGuard, EvaluationMode, TriggerEvaluator};
pub use instrument::{inst_id_to_symbol, symbol_to_inst_id};
pub use market_state::MarketStateCache;
pub use retry::{retry_with_backoff, RetryPolicy, Retryable};
pub use strategy_registry::StrategyRegistry;
pub use trade::{ClosePosition, OrderType, PlaceOrder, TradeRequest};
pub use traits::{AuditSink, CredentialSource, MarketSnapshotSource, StrategySource, TradeExecutor};
pub use types::{
    ApiCredentials, CandleDirection, CandleUpdate, Decision, HoldReason, MarginMode, PosSide,
    PositionSnapshot, Side, StrategyConfig, StrategyStatus,
};
