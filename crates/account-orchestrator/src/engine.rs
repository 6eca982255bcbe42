//! Per-account evaluation state: strategy registry, candle directions and the
//! trigger evaluator with its debounce map.
//!
//! The feed-driven, tick and forwarded-event front ends differ only in how
//! they obtain a [`PositionSnapshot`]; all of them end up in
//! [`AccountEngine::evaluate`].

use chrono::{DateTime, Utc};
use position_guard_core::{
    symbol_to_inst_id, CandleDirection, CandleUpdate, Decision, EngineConfig, EvaluationMode,
    MarketStateCache, PositionSnapshot, StrategyConfig, StrategyRegistry, TriggerEvaluator,
};
use serde::Serialize;
use tracing::debug;

/// An actionable decision together with everything the dispatcher needs.
#[derive(Debug, Clone)]
pub struct PlannedAction {
    pub strategy: StrategyConfig,
    pub snapshot: PositionSnapshot,
    pub decision: Decision,
}

/// Result of evaluating one (position, strategy) pair, kept for reporting.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationRecord {
    pub strategy_id: String,
    pub symbol: String,
    pub decision: Decision,
}

#[derive(Debug, Default)]
pub struct Evaluation {
    pub actions: Vec<PlannedAction>,
    pub records: Vec<EvaluationRecord>,
}

pub struct AccountEngine {
    account_id: String,
    registry: StrategyRegistry,
    market: MarketStateCache,
    evaluator: TriggerEvaluator,
}

impl AccountEngine {
    #[must_use]
    pub fn new(account_id: impl Into<String>, config: &EngineConfig) -> Self {
        Self {
            account_id: account_id.into(),
            registry: StrategyRegistry::new(),
            market: MarketStateCache::new(),
            evaluator: TriggerEvaluator::new(config.debounce_window())
                .with_tick_bootstrap(config.tick_bootstrap),
        }
    }

    pub fn replace_strategies(&mut self, strategies: Vec<StrategyConfig>, now: DateTime<Utc>) {
        self.registry.replace(strategies, now);
        debug!(
            account_id = %self.account_id,
            strategies = self.registry.strategy_count(),
            symbols = self.registry.symbols().len(),
            "Strategy registry replaced"
        );
    }

    pub fn apply_candle(&mut self, update: &CandleUpdate) -> Option<CandleDirection> {
        self.market.apply(update)
    }

    pub fn set_direction(&mut self, symbol: impl Into<String>, direction: CandleDirection) {
        self.market.set(symbol, direction);
    }

    /// Evaluates a snapshot against every strategy mapped to its symbol, in
    /// registry order. The debounce gate is per instrument, so once one
    /// strategy acts the rest hold for the window.
    pub fn evaluate(
        &mut self,
        snapshot: &PositionSnapshot,
        mode: EvaluationMode,
        now: DateTime<Utc>,
    ) -> Evaluation {
        let direction = self.market.direction(&snapshot.symbol);
        let mut evaluation = Evaluation::default();

        for strategy in self.registry.for_symbol(&snapshot.symbol) {
            let decision = self
                .evaluator
                .evaluate(snapshot, strategy, direction, mode, now);

            evaluation.records.push(EvaluationRecord {
                strategy_id: strategy.id.clone(),
                symbol: strategy.symbol.clone(),
                decision: decision.clone(),
            });

            if decision.is_actionable() {
                evaluation.actions.push(PlannedAction {
                    strategy: strategy.clone(),
                    snapshot: snapshot.clone(),
                    decision,
                });
            }
        }

        evaluation
    }

    /// Live evaluation of a positions push.
    pub fn evaluate_positions(
        &mut self,
        positions: &[PositionSnapshot],
        now: DateTime<Utc>,
    ) -> Evaluation {
        let mut evaluation = Evaluation::default();
        for snapshot in positions {
            let next = self.evaluate(snapshot, EvaluationMode::Live, now);
            evaluation.actions.extend(next.actions);
            evaluation.records.extend(next.records);
        }
        evaluation
    }

    /// Instrument ids for every mapped symbol, for candle subscriptions.
    #[must_use]
    pub fn subscribed_inst_ids(&self) -> Vec<String> {
        self.registry
            .symbols()
            .iter()
            .filter_map(|symbol| symbol_to_inst_id(symbol))
            .collect()
    }

    /// Drops strategies, directions and debounce entries.
    pub fn reset(&mut self) {
        self.registry.clear();
        self.market.clear();
        self.evaluator.reset();
    }

    #[must_use]
    pub const fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    #[must_use]
    pub const fn market(&self) -> &MarketStateCache {
        &self.market
    }

    #[must_use]
    pub fn debounce_entries(&self) -> usize {
        self.evaluator.debounce().len()
    }
}
