use anyhow::Result;
use chrono::{DateTime, Utc};
use position_guard_core::{CandleDirection, PosSide};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tokio::sync::oneshot;

use crate::dispatcher::ActionReport;
use crate::tick::TickReport;

#[derive(Debug)]
pub enum AccountCommand {
    Start(StartOptions),
    Stop,
    Refresh { symbol: Option<String> },
    Tick {
        only_symbols: Option<Vec<String>>,
        reply: oneshot::Sender<Result<TickReport>>,
    },
    Ingest(IngestEvent),
    GetStatus(oneshot::Sender<AccountStatus>),
    Shutdown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StartOptions {
    /// Open the venue websocket feeds. Without them the account only reacts
    /// to forwarded events and tick requests.
    #[serde(default = "default_feeds")]
    pub feeds: bool,
}

const fn default_feeds() -> bool {
    true
}

impl Default for StartOptions {
    fn default() -> Self {
        Self { feeds: true }
    }
}

/// Event pushed by an external forwarder instead of the account's own feeds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum IngestEvent {
    #[serde(rename_all = "camelCase")]
    Position {
        symbol: String,
        pos_side: PosSide,
        #[serde(with = "rust_decimal::serde::float")]
        size: Decimal,
        upl_ratio: f64,
    },
    #[serde(rename_all = "camelCase")]
    Direction {
        symbol: String,
        candle_dir: CandleDirection,
    },
}

impl IngestEvent {
    #[must_use]
    pub fn symbol(&self) -> &str {
        match self {
            Self::Position { symbol, .. } | Self::Direction { symbol, .. } => symbol,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccountState {
    Stopped,
    Starting,
    Running,
    Error,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FeedStatus {
    pub enabled: bool,
    pub private_connected: bool,
    pub public_connected: bool,
    pub public_subscriptions: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchCounters {
    pub in_flight: usize,
    pub completed: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountStatus {
    pub account_id: String,
    pub state: AccountState,
    pub started_at: Option<DateTime<Utc>>,
    pub last_refresh: Option<DateTime<Utc>>,
    pub credentials_loaded: bool,
    pub feeds: FeedStatus,
    pub strategies: usize,
    pub symbols: Vec<String>,
    pub directions: BTreeMap<String, CandleDirection>,
    pub debounce_entries: usize,
    pub dispatch: DispatchCounters,
    pub recent_actions: VecDeque<ActionReport>,
    pub last_error: Option<String>,
}

impl AccountStatus {
    #[must_use]
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            state: AccountState::Stopped,
            started_at: None,
            last_refresh: None,
            credentials_loaded: false,
            feeds: FeedStatus::default(),
            strategies: 0,
            symbols: Vec::new(),
            directions: BTreeMap::new(),
            debounce_entries: 0,
            dispatch: DispatchCounters::default(),
            recent_actions: VecDeque::new(),
            last_error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn ingest_event_shapes() {
        let position: IngestEvent = serde_json::from_value(json!({
            "symbol": "BTC/USDT:USDT",
            "posSide": "long",
            "size": 2,
            "uplRatio": 0.06
        }))
        .unwrap();
        assert_eq!(
            position,
            IngestEvent::Position {
                symbol: "BTC/USDT:USDT".to_string(),
                pos_side: PosSide::Long,
                size: dec!(2),
                upl_ratio: 0.06,
            }
        );

        let direction: IngestEvent =
            serde_json::from_value(json!({"symbol": "ETH/USDT:USDT", "candleDir": "down"}))
                .unwrap();
        assert_eq!(direction.symbol(), "ETH/USDT:USDT");
        assert!(matches!(
            direction,
            IngestEvent::Direction {
                candle_dir: CandleDirection::Down,
                ..
            }
        ));

        assert!(serde_json::from_value::<IngestEvent>(json!({"symbol": "X"})).is_err());
    }

    #[test]
    fn start_options_default_to_feeds() {
        let options: StartOptions = serde_json::from_value(json!({})).unwrap();
        assert!(options.feeds);
    }
}
