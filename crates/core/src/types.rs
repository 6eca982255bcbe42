use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::instrument;

/// Side of an open derivative position.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PosSide {
    Long,
    Short,
}

impl PosSide {
    /// Order side that reduces or offsets this position.
    #[must_use]
    pub const fn closing_side(self) -> Side {
        match self {
            Self::Long => Side::Sell,
            Self::Short => Side::Buy,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Long => "long",
            Self::Short => "short",
        }
    }
}

impl fmt::Display for PosSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order side sent to the trade-execution endpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of the most recent hourly candle for a symbol.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CandleDirection {
    Up,
    Down,
}

impl CandleDirection {
    /// `close >= open` is an up candle, anything else is down.
    #[must_use]
    pub fn from_open_close(open: Decimal, close: Decimal) -> Self {
        if close >= open {
            Self::Up
        } else {
            Self::Down
        }
    }

    /// True when the candle moves against the given position side.
    #[must_use]
    pub const fn is_adverse_to(self, side: PosSide) -> bool {
        matches!((side, self), (PosSide::Long, Self::Down) | (PosSide::Short, Self::Up))
    }

    /// Entry side derived from an optional direction. Unknown direction enters short.
    #[must_use]
    pub const fn entry_side(direction: Option<Self>) -> Side {
        match direction {
            Some(Self::Up) => Side::Buy,
            Some(Self::Down) | None => Side::Sell,
        }
    }
}

/// Margin mode forwarded to the trade-execution endpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MarginMode {
    #[default]
    Isolated,
    Cross,
}

impl MarginMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Isolated => "isolated",
            Self::Cross => "cross",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StrategyStatus {
    Running,
    Paused,
}

/// Per-symbol trading parameters owned by the external strategy store.
///
/// Ratios are fractions (`0.05` = 5 %). Store rows holding percentages are
/// converted once when the record is loaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrategyConfig {
    pub id: String,
    pub account_id: String,
    pub symbol: String,
    pub status: StrategyStatus,
    pub profit_ratio: f64,
    pub loss_stop_ratio: f64,
    #[serde(default)]
    pub margin_mode: MarginMode,
    #[serde(default)]
    pub range_low: Option<Decimal>,
    #[serde(default)]
    pub range_high: Option<Decimal>,
    #[serde(default)]
    pub entry_size: Option<Decimal>,
    /// Carried for operators; the engine does not act on it.
    #[serde(default)]
    pub auto_restart_on_price_return: bool,
    #[serde(default)]
    pub signal_type: Option<String>,
}

impl StrategyConfig {
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == StrategyStatus::Running
    }

    /// Inclusive range check. Missing bounds are open ended.
    #[must_use]
    pub fn in_range(&self, price: Decimal) -> bool {
        let above_low = self.range_low.map_or(true, |low| price >= low);
        let below_high = self.range_high.map_or(true, |high| price <= high);
        above_low && below_high
    }

    #[must_use]
    pub fn has_range(&self) -> bool {
        self.range_low.is_some() || self.range_high.is_some()
    }

    /// Venue instrument id for this strategy's symbol.
    #[must_use]
    pub fn inst_id(&self) -> Option<String> {
        instrument::symbol_to_inst_id(&self.symbol)
    }
}

/// One position as reported by the venue, normalised to an absolute size.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PositionSnapshot {
    pub inst_id: String,
    pub symbol: String,
    pub pos_side: PosSide,
    pub size: Decimal,
    pub upl_ratio: f64,
    #[serde(default)]
    pub mark_price: Option<Decimal>,
}

impl PositionSnapshot {
    /// Placeholder for an instrument with no open position.
    #[must_use]
    pub fn flat(inst_id: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            inst_id: inst_id.into(),
            symbol: symbol.into(),
            pos_side: PosSide::Long,
            size: Decimal::ZERO,
            upl_ratio: 0.0,
            mark_price: None,
        }
    }

    #[must_use]
    pub fn is_flat(&self) -> bool {
        self.size.is_zero()
    }
}

/// Newest candle of a public candle push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandleUpdate {
    pub inst_id: String,
    pub open: Decimal,
    pub close: Decimal,
    pub ts: Option<i64>,
}

impl CandleUpdate {
    #[must_use]
    pub fn direction(&self) -> CandleDirection {
        CandleDirection::from_open_close(self.open, self.close)
    }
}

/// Why an evaluation produced no action.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HoldReason {
    StrategyPaused,
    Debounced,
    OutOfRange,
    FlatPosition,
    HedgeUnconfirmed,
    BelowThresholds,
}

impl fmt::Display for HoldReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::StrategyPaused => "strategy paused",
            Self::Debounced => "debounced",
            Self::OutOfRange => "paused: out of range",
            Self::FlatPosition => "no open position",
            Self::HedgeUnconfirmed => "loss threshold reached without adverse candle",
            Self::BelowThresholds => "below thresholds",
        };
        f.write_str(text)
    }
}

/// Outcome of evaluating one position against one strategy.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Decision {
    Hold { reason: HoldReason },
    /// Open an offsetting position of equal size.
    Hedge { side: Side, size: Decimal },
    /// Close the position, then re-enter after the re-entry delay.
    TakeProfit {
        pos_side: PosSide,
        size: Decimal,
        reentry_side: Side,
        reentry_size: Decimal,
    },
    /// Open from flat.
    OpenInitial { side: Side, size: Decimal },
}

impl Decision {
    #[must_use]
    pub const fn hold(reason: HoldReason) -> Self {
        Self::Hold { reason }
    }

    #[must_use]
    pub const fn is_actionable(&self) -> bool {
        !matches!(self, Self::Hold { .. })
    }

    #[must_use]
    pub const fn hold_reason(&self) -> Option<HoldReason> {
        match self {
            Self::Hold { reason } => Some(*reason),
            _ => None,
        }
    }

    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Hold { .. } => "hold",
            Self::Hedge { .. } => "hedge",
            Self::TakeProfit { .. } => "take_profit",
            Self::OpenInitial { .. } => "open_initial",
        }
    }
}

/// Venue API credentials for one account.
#[derive(Debug)]
pub struct ApiCredentials {
    /// Store id, forwarded to the trade endpoint as `credentialId`.
    pub id: String,
    pub api_key: String,
    pub api_secret: SecretString,
    pub passphrase: SecretString,
}

impl ApiCredentials {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        passphrase: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            api_key: api_key.into(),
            api_secret: SecretString::from(api_secret.into()),
            passphrase: SecretString::from(passphrase.into()),
        }
    }

    #[must_use]
    pub fn secret(&self) -> &str {
        self.api_secret.expose_secret()
    }

    #[must_use]
    pub fn passphrase(&self) -> &str {
        self.passphrase.expose_secret()
    }
}
