//! Trigger evaluation for position updates.
//!
//! Rules are applied in a fixed order and the first one that matches wins:
//!
//! 1. paused strategies never act
//! 2. debounce: one decision per instrument inside the window
//! 3. range gate (tick evaluation only; an unknown price is out of range)
//! 4. flat positions: hold, or bootstrap an entry in tick evaluation
//! 5. hedge: loss threshold breached and the hourly candle confirms the move
//! 6. take-profit: profit threshold reached, re-entry side follows the candle
//! 7. otherwise hold

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::types::{CandleDirection, Decision, HoldReason, PositionSnapshot, StrategyConfig};

/// How the snapshot was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationMode {
    /// Pushed by the private positions feed.
    Live,
    /// Polled on demand. Carries the last traded price for the range gate.
    Tick { last_price: Option<Decimal> },
}

/// Per-instrument suppression window.
#[derive(Debug, Clone)]
pub struct DebounceGuard {
    window: Duration,
    last_decision: HashMap<String, DateTime<Utc>>,
}

impl DebounceGuard {
    #[must_use]
    pub fn new(window: std::time::Duration) -> Self {
        Self {
            window: Duration::from_std(window).unwrap_or_else(|_| Duration::seconds(2)),
            last_decision: HashMap::new(),
        }
    }

    #[must_use]
    pub fn is_suppressed(&self, inst_id: &str, now: DateTime<Utc>) -> bool {
        self.last_decision
            .get(inst_id)
            .is_some_and(|last| now.signed_duration_since(*last) < self.window)
    }

    pub fn mark(&mut self, inst_id: &str, now: DateTime<Utc>) {
        self.last_decision.insert(inst_id.to_string(), now);
    }

    pub fn clear(&mut self) {
        self.last_decision.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.last_decision.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.last_decision.is_empty()
    }
}

/// Stateful evaluator: the rule set plus the debounce map it guards.
#[derive(Debug, Clone)]
pub struct TriggerEvaluator {
    debounce: DebounceGuard,
    tick_bootstrap: bool,
}

impl TriggerEvaluator {
    #[must_use]
    pub fn new(debounce_window: std::time::Duration) -> Self {
        Self {
            debounce: DebounceGuard::new(debounce_window),
            tick_bootstrap: true,
        }
    }

    /// Enables or disables opening from flat during tick evaluation.
    #[must_use]
    pub const fn with_tick_bootstrap(mut self, enabled: bool) -> Self {
        self.tick_bootstrap = enabled;
        self
    }

    /// Evaluates one position against one strategy.
    ///
    /// Any actionable decision marks the instrument as debounced at `now`,
    /// before the action is dispatched.
    pub fn evaluate(
        &mut self,
        snapshot: &PositionSnapshot,
        strategy: &StrategyConfig,
        direction: Option<CandleDirection>,
        mode: EvaluationMode,
        now: DateTime<Utc>,
    ) -> Decision {
        if !strategy.is_running() {
            return Decision::hold(HoldReason::StrategyPaused);
        }

        if self.debounce.is_suppressed(&snapshot.inst_id, now) {
            debug!(inst_id = %snapshot.inst_id, strategy_id = %strategy.id, "Debounced");
            return Decision::hold(HoldReason::Debounced);
        }

        let decision = decide(snapshot, strategy, direction, mode, self.tick_bootstrap);
        if decision.is_actionable() {
            self.debounce.mark(&snapshot.inst_id, now);
        }
        decision
    }

    pub fn reset(&mut self) {
        self.debounce.clear();
    }

    #[must_use]
    pub const fn debounce(&self) -> &DebounceGuard {
        &self.debounce
    }
}

/// Stateless part of the rule set (everything after the debounce gate).
#[must_use]
pub fn decide(
    snapshot: &PositionSnapshot,
    strategy: &StrategyConfig,
    direction: Option<CandleDirection>,
    mode: EvaluationMode,
    tick_bootstrap: bool,
) -> Decision {
    if let EvaluationMode::Tick { last_price } = mode {
        if strategy.has_range() && !last_price.is_some_and(|price| strategy.in_range(price)) {
            info!(
                strategy_id = %strategy.id,
                symbol = %strategy.symbol,
                price = ?last_price,
                range_low = ?strategy.range_low,
                range_high = ?strategy.range_high,
                "paused: out of range"
            );
            return Decision::hold(HoldReason::OutOfRange);
        }
    }

    if snapshot.is_flat() {
        let bootstrap_size = match mode {
            EvaluationMode::Tick { .. } if tick_bootstrap => {
                strategy.entry_size.filter(|size| *size > Decimal::ZERO)
            }
            _ => None,
        };
        return bootstrap_size.map_or(Decision::hold(HoldReason::FlatPosition), |size| {
            Decision::OpenInitial {
                side: CandleDirection::entry_side(direction),
                size,
            }
        });
    }

    let loss_breached =
        strategy.loss_stop_ratio > 0.0 && snapshot.upl_ratio <= -strategy.loss_stop_ratio;

    if loss_breached && direction.is_some_and(|d| d.is_adverse_to(snapshot.pos_side)) {
        return Decision::Hedge {
            side: snapshot.pos_side.closing_side(),
            size: snapshot.size,
        };
    }

    if snapshot.upl_ratio >= strategy.profit_ratio {
        return Decision::TakeProfit {
            pos_side: snapshot.pos_side,
            size: snapshot.size,
            reentry_side: CandleDirection::entry_side(direction),
            reentry_size: snapshot.size,
        };
    }

    let reason = if loss_breached {
        HoldReason::HedgeUnconfirmed
    } else {
        HoldReason::BelowThresholds
    };
    debug!(
        strategy_id = %strategy.id,
        inst_id = %snapshot.inst_id,
        pos_side = %snapshot.pos_side,
        size = %snapshot.size,
        upl_ratio = snapshot.upl_ratio,
        profit_ratio = strategy.profit_ratio,
        loss_stop_ratio = strategy.loss_stop_ratio,
        direction = ?direction,
        %reason,
        "No trigger"
    );
    Decision::hold(reason)
}
