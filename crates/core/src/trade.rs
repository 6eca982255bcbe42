use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{MarginMode, PosSide, Side};

/// Body posted to the trade-execution endpoint: `{"action": ..., "data": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", content = "data", rename_all = "camelCase")]
pub enum TradeRequest {
    PlaceOrder(PlaceOrder),
    ClosePosition(ClosePosition),
}

impl TradeRequest {
    #[must_use]
    pub const fn action(&self) -> &'static str {
        match self {
            Self::PlaceOrder(_) => "placeOrder",
            Self::ClosePosition(_) => "closePosition",
        }
    }

    #[must_use]
    pub fn symbol(&self) -> &str {
        match self {
            Self::PlaceOrder(order) => &order.symbol,
            Self::ClosePosition(close) => &close.symbol,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    #[default]
    Market,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrder {
    pub strategy_id: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    #[serde(with = "rust_decimal::serde::float")]
    pub size: Decimal,
    pub margin_mode: MarginMode,
    pub credential_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClosePosition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy_id: Option<String>,
    pub symbol: String,
    pub pos_side: PosSide,
    pub margin_mode: MarginMode,
    pub credential_id: String,
}
