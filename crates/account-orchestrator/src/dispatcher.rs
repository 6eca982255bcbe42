//! Turns decisions into delayed calls to the trade-execution endpoint.
//!
//! Timing, measured from the moment the decision was made:
//!
//! ```text
//! Hedge        ──── hedge delay ────► placeOrder(opposite side)
//! TakeProfit   ── close jitter ──► closePosition ── re-entry delay ──► placeOrder
//! OpenInitial  ── close jitter ──► placeOrder
//! ```
//!
//! Every task is detached and runs to completion; the owning actor only learns
//! about it through the [`ActionReport`] sent back when it finishes.

use chrono::{DateTime, Utc};
use position_guard_core::{
    AuditRecord, AuditSink, ClosePosition, Decision, EngineConfig, OrderType, PlaceOrder, Side,
    StrategyConfig, TradeExecutor, TradeRequest,
};
use rand::Rng;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::engine::PlannedAction;

/// Pacing between a decision and its external calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchDelays {
    pub hedge: Duration,
    pub close_jitter_min: Duration,
    pub close_jitter_max: Duration,
    pub reentry: Duration,
}

impl DispatchDelays {
    #[must_use]
    pub const fn from_config(config: &EngineConfig) -> Self {
        Self {
            hedge: Duration::from_millis(config.hedge_delay_ms),
            close_jitter_min: Duration::from_millis(config.close_jitter_min_ms),
            close_jitter_max: Duration::from_millis(config.close_jitter_max_ms),
            reentry: Duration::from_millis(config.reentry_delay_ms),
        }
    }

    /// Uniform draw from the close jitter window.
    #[must_use]
    pub fn close_jitter(&self) -> Duration {
        if self.close_jitter_max <= self.close_jitter_min {
            return self.close_jitter_min;
        }
        let min = self.close_jitter_min.as_millis() as u64;
        let max = self.close_jitter_max.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

impl Default for DispatchDelays {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Hedge,
    Close,
    Reentry,
    OpenInitial,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
    pub kind: StepKind,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

/// Summary of one dispatched decision, sent back to the owning actor.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionReport {
    pub strategy_id: String,
    pub symbol: String,
    pub decision: &'static str,
    pub steps: Vec<StepOutcome>,
}

impl ActionReport {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.steps.iter().all(|step| step.ok)
    }
}

#[derive(Clone)]
pub struct ActionDispatcher {
    credential_id: String,
    executor: Arc<dyn TradeExecutor>,
    audit: Arc<dyn AuditSink>,
    delays: DispatchDelays,
    report_tx: Option<mpsc::UnboundedSender<ActionReport>>,
}

impl ActionDispatcher {
    #[must_use]
    pub fn new(
        credential_id: impl Into<String>,
        executor: Arc<dyn TradeExecutor>,
        audit: Arc<dyn AuditSink>,
        delays: DispatchDelays,
    ) -> Self {
        Self {
            credential_id: credential_id.into(),
            executor,
            audit,
            delays,
            report_tx: None,
        }
    }

    /// Sends an [`ActionReport`] on this channel when each action finishes.
    #[must_use]
    pub fn with_reports(mut self, report_tx: mpsc::UnboundedSender<ActionReport>) -> Self {
        self.report_tx = Some(report_tx);
        self
    }

    #[must_use]
    pub const fn delays(&self) -> DispatchDelays {
        self.delays
    }

    /// Schedules the action. Hold decisions are ignored.
    pub fn dispatch(&self, action: PlannedAction) -> Option<JoinHandle<()>> {
        if !action.decision.is_actionable() {
            return None;
        }
        let this = self.clone();
        Some(tokio::spawn(async move {
            let report = this.run(action).await;
            if let Some(tx) = &this.report_tx {
                let _ = tx.send(report);
            }
        }))
    }

    async fn run(&self, action: PlannedAction) -> ActionReport {
        let PlannedAction {
            strategy,
            snapshot,
            decision,
        } = action;
        let label = decision.label();
        let mut steps = Vec::new();

        match decision {
            Decision::Hold { .. } => {}
            Decision::Hedge { side, size } => {
                sleep(self.delays.hedge).await;
                let request = self.place_order(&strategy, side, size);
                let message = format!(
                    "Hedge {side} {size} on {} after loss of {:.4}",
                    strategy.symbol, snapshot.upl_ratio
                );
                steps.push(self.step(StepKind::Hedge, &strategy.id, message, request).await);
            }
            Decision::TakeProfit {
                pos_side,
                size,
                reentry_side,
                reentry_size,
            } => {
                sleep(self.delays.close_jitter()).await;
                let close = TradeRequest::ClosePosition(ClosePosition {
                    strategy_id: Some(strategy.id.clone()),
                    symbol: strategy.symbol.clone(),
                    pos_side,
                    margin_mode: strategy.margin_mode,
                    credential_id: self.credential_id.clone(),
                });
                let message = format!(
                    "Take profit: close {pos_side} {size} on {} at {:.4}",
                    strategy.symbol, snapshot.upl_ratio
                );
                let closed = self.step(StepKind::Close, &strategy.id, message, close).await;
                let close_ok = closed.ok;
                steps.push(closed);

                if close_ok {
                    sleep(self.delays.reentry).await;
                    let request = self.place_order(&strategy, reentry_side, reentry_size);
                    let message =
                        format!("Re-entry {reentry_side} {reentry_size} on {}", strategy.symbol);
                    steps.push(self.step(StepKind::Reentry, &strategy.id, message, request).await);
                } else {
                    info!(
                        strategy_id = %strategy.id,
                        symbol = %strategy.symbol,
                        "Close failed, re-entry skipped"
                    );
                }
            }
            Decision::OpenInitial { side, size } => {
                sleep(self.delays.close_jitter()).await;
                let request = self.place_order(&strategy, side, size);
                let message = format!("Initial entry {side} {size} on {}", strategy.symbol);
                steps.push(self.step(StepKind::OpenInitial, &strategy.id, message, request).await);
            }
        }

        ActionReport {
            strategy_id: strategy.id,
            symbol: strategy.symbol,
            decision: label,
            steps,
        }
    }

    fn place_order(&self, strategy: &StrategyConfig, side: Side, size: Decimal) -> TradeRequest {
        TradeRequest::PlaceOrder(PlaceOrder {
            strategy_id: strategy.id.clone(),
            symbol: strategy.symbol.clone(),
            side,
            order_type: OrderType::Market,
            size,
            margin_mode: strategy.margin_mode,
            credential_id: self.credential_id.clone(),
        })
    }

    /// Audits, executes one request and audits a failure.
    async fn step(
        &self,
        kind: StepKind,
        strategy_id: &str,
        message: String,
        request: TradeRequest,
    ) -> StepOutcome {
        let payload = serde_json::to_value(&request).unwrap_or_default();
        self.record(AuditRecord::info(Some(strategy_id), message, payload.clone()))
            .await;

        let result = self.executor.execute(&request).await;
        let error = match result {
            Ok(response) => {
                info!(
                    strategy_id,
                    action = request.action(),
                    symbol = request.symbol(),
                    ?kind,
                    "Trade request executed"
                );
                debug!(strategy_id, response = %response, "Trade endpoint response");
                None
            }
            Err(e) => {
                error!(
                    strategy_id,
                    action = request.action(),
                    symbol = request.symbol(),
                    ?kind,
                    error = %e,
                    "Trade request failed"
                );
                self.record(AuditRecord::error(
                    Some(strategy_id),
                    format!("{} failed: {e:#}", request.action()),
                    json!({ "request": payload }),
                ))
                .await;
                Some(format!("{e:#}"))
            }
        };

        StepOutcome {
            kind,
            ok: error.is_none(),
            error,
            finished_at: Utc::now(),
        }
    }

    async fn record(&self, record: AuditRecord) {
        if let Err(e) = self.audit.record(record).await {
            warn!(error = %e, "Audit write failed");
        }
    }
}
