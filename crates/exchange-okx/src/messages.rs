//! Websocket and REST payloads.
//!
//! Data pushes look like
//!
//! ```json
//! {"arg": {"channel": "positions", "instType": "SWAP"},
//!  "data": [{"instId": "BTC-USDT-SWAP", "posSide": "long", "pos": "2", "uplRatio": "0.06"}]}
//! ```
//!
//! and candle pushes carry `[ts, o, h, l, c, vol, ...]` string tuples. Control
//! replies use `{"event": "login" | "subscribe" | "error", "code": ..., "msg": ...}`.
//! Anything that does not fit is dropped.

use position_guard_core::{inst_id_to_symbol, CandleUpdate, PosSide, PositionSnapshot};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use tracing::debug;

pub const POSITIONS_CHANNEL: &str = "positions";

/// One entry of a subscribe request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionArg {
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inst_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inst_id: Option<String>,
}

impl SubscriptionArg {
    #[must_use]
    pub fn positions(inst_type: &str) -> Self {
        Self {
            channel: POSITIONS_CHANNEL.to_string(),
            inst_type: Some(inst_type.to_string()),
            inst_id: None,
        }
    }

    #[must_use]
    pub fn candle(channel: &str, inst_id: &str) -> Self {
        Self {
            channel: channel.to_string(),
            inst_type: None,
            inst_id: Some(inst_id.to_string()),
        }
    }
}

#[must_use]
pub fn subscribe_frame(args: &[SubscriptionArg]) -> Value {
    serde_json::json!({ "op": "subscribe", "args": args })
}

/// Control reply from the server.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventFrame {
    pub event: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub arg: Option<SubscriptionArg>,
    #[serde(default)]
    pub conn_id: Option<String>,
}

impl EventFrame {
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.event == "error"
    }

    #[must_use]
    pub fn is_login_ok(&self) -> bool {
        self.event == "login" && self.code.as_deref().map_or(true, |code| code == "0")
    }
}

/// Classified inbound websocket frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedFrame {
    Positions(Vec<PositionSnapshot>),
    Candle(CandleUpdate),
    Event(EventFrame),
    Pong,
    Ignored,
}

#[derive(Debug, Deserialize)]
struct PushFrame {
    arg: PushArg,
    #[serde(default)]
    data: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PushArg {
    channel: String,
    #[serde(default)]
    inst_id: Option<String>,
}

/// Position row as returned by both the push channel and the REST endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRow {
    pub inst_id: String,
    #[serde(default)]
    pub pos_side: String,
    #[serde(default)]
    pub pos: String,
    #[serde(default)]
    pub upl_ratio: String,
    #[serde(default)]
    pub mark_px: String,
}

impl PositionRow {
    /// Normalises the row. Net-mode rows take their side from the sign of `pos`.
    #[must_use]
    pub fn into_snapshot(self) -> Option<PositionSnapshot> {
        let symbol = inst_id_to_symbol(&self.inst_id)?;
        let signed = if self.pos.is_empty() {
            Decimal::ZERO
        } else {
            Decimal::from_str(&self.pos).ok()?
        };

        let pos_side = match self.pos_side.as_str() {
            "long" => PosSide::Long,
            "short" => PosSide::Short,
            "net" | "" => {
                if signed.is_sign_negative() {
                    PosSide::Short
                } else {
                    PosSide::Long
                }
            }
            _ => return None,
        };
        let size = signed.abs();

        let upl_ratio = match self.upl_ratio.parse::<f64>() {
            Ok(ratio) if ratio.is_finite() => ratio,
            _ if size.is_zero() => 0.0,
            _ => return None,
        };

        Some(PositionSnapshot {
            inst_id: self.inst_id,
            symbol,
            pos_side,
            size,
            upl_ratio,
            mark_price: Decimal::from_str(&self.mark_px).ok(),
        })
    }
}

/// Parses a candle tuple `[ts, o, h, l, c, ...]`.
#[must_use]
pub fn parse_candle(inst_id: &str, row: &Value) -> Option<CandleUpdate> {
    let fields = row.as_array()?;
    if fields.len() < 5 {
        return None;
    }
    let open = Decimal::from_str(fields[1].as_str()?).ok()?;
    let close = Decimal::from_str(fields[4].as_str()?).ok()?;
    let ts = fields[0].as_str().and_then(|ts| ts.parse::<i64>().ok());
    Some(CandleUpdate {
        inst_id: inst_id.to_string(),
        open,
        close,
        ts,
    })
}

/// Classifies one text frame.
#[must_use]
pub fn parse_frame(text: &str, candle_channel: &str) -> FeedFrame {
    if text == "pong" {
        return FeedFrame::Pong;
    }

    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            debug!(error = %e, "Dropping non-JSON frame");
            return FeedFrame::Ignored;
        }
    };

    if value.get("event").is_some() {
        return serde_json::from_value(value).map_or(FeedFrame::Ignored, FeedFrame::Event);
    }

    let Ok(push) = serde_json::from_value::<PushFrame>(value) else {
        return FeedFrame::Ignored;
    };

    if push.arg.channel == POSITIONS_CHANNEL {
        let positions: Vec<PositionSnapshot> = push
            .data
            .into_iter()
            .filter_map(|row| serde_json::from_value::<PositionRow>(row).ok())
            .filter_map(PositionRow::into_snapshot)
            .collect();
        return FeedFrame::Positions(positions);
    }

    if push.arg.channel == candle_channel {
        let candle = push
            .arg
            .inst_id
            .as_deref()
            .and_then(|inst_id| push.data.first().and_then(|row| parse_candle(inst_id, row)));
        return candle.map_or(FeedFrame::Ignored, FeedFrame::Candle);
    }

    FeedFrame::Ignored
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const CANDLE: &str = "candle1H";

    #[test]
    fn parses_positions_push() {
        let frame = parse_frame(
            r#"{"arg":{"channel":"positions","instType":"SWAP","uid":"1"},
                "data":[{"instId":"BTC-USDT-SWAP","posSide":"long","pos":"2","uplRatio":"0.06","markPx":"65000.1"},
                        {"instId":"ETH-USDT-SWAP","posSide":"short","pos":"-3","uplRatio":"-0.12"}]}"#,
            CANDLE,
        );

        let FeedFrame::Positions(positions) = frame else {
            panic!("expected positions, got {frame:?}");
        };
        assert_eq!(positions.len(), 2);
        assert_eq!(positions[0].symbol, "BTC/USDT:USDT");
        assert_eq!(positions[0].pos_side, PosSide::Long);
        assert_eq!(positions[0].size, dec!(2));
        assert_eq!(positions[0].mark_price, Some(dec!(65000.1)));
        assert_eq!(positions[1].pos_side, PosSide::Short);
        assert_eq!(positions[1].size, dec!(3));
        assert!((positions[1].upl_ratio + 0.12).abs() < 1e-12);
    }

    #[test]
    fn net_mode_side_follows_sign() {
        let row = PositionRow {
            inst_id: "SOL-USDT-SWAP".to_string(),
            pos_side: "net".to_string(),
            pos: "-5".to_string(),
            upl_ratio: "0.01".to_string(),
            mark_px: String::new(),
        };
        let snapshot = row.into_snapshot().unwrap();
        assert_eq!(snapshot.pos_side, PosSide::Short);
        assert_eq!(snapshot.size, dec!(5));
    }

    #[test]
    fn closed_position_without_ratio_is_flat() {
        let row = PositionRow {
            inst_id: "BTC-USDT-SWAP".to_string(),
            pos_side: "long".to_string(),
            pos: "0".to_string(),
            upl_ratio: String::new(),
            mark_px: String::new(),
        };
        let snapshot = row.into_snapshot().unwrap();
        assert!(snapshot.is_flat());
    }

    #[test]
    fn malformed_position_rows_are_dropped() {
        let frame = parse_frame(
            r#"{"arg":{"channel":"positions"},
                "data":[{"instId":"BTC-USDT-SWAP","posSide":"long","pos":"abc","uplRatio":"0.1"},
                        {"instId":"BTC-USDT","posSide":"long","pos":"1","uplRatio":"0.1"},
                        {"instId":"BTC-USDT-SWAP","posSide":"long","pos":"1","uplRatio":""},
                        {"posSide":"long"}]}"#,
            CANDLE,
        );
        assert_eq!(frame, FeedFrame::Positions(Vec::new()));
    }

    #[test]
    fn parses_candle_push() {
        let frame = parse_frame(
            r#"{"arg":{"channel":"candle1H","instId":"BTC-USDT-SWAP"},
                "data":[["1700000000000","100","110","95","99","12","0","0","0"]]}"#,
            CANDLE,
        );
        let FeedFrame::Candle(candle) = frame else {
            panic!("expected candle, got {frame:?}");
        };
        assert_eq!(candle.inst_id, "BTC-USDT-SWAP");
        assert_eq!(candle.open, dec!(100));
        assert_eq!(candle.close, dec!(99));
        assert_eq!(candle.ts, Some(1_700_000_000_000));
    }

    #[test]
    fn short_or_malformed_candles_are_dropped() {
        for text in [
            r#"{"arg":{"channel":"candle1H","instId":"BTC-USDT-SWAP"},"data":[["1","2","3","4"]]}"#,
            r#"{"arg":{"channel":"candle1H","instId":"BTC-USDT-SWAP"},"data":[["1","x","3","4","5"]]}"#,
            r#"{"arg":{"channel":"candle1H"},"data":[["1","2","3","4","5"]]}"#,
            r#"{"arg":{"channel":"candle1H","instId":"BTC-USDT-SWAP"},"data":[]}"#,
        ] {
            assert_eq!(parse_frame(text, CANDLE), FeedFrame::Ignored, "{text}");
        }
    }

    #[test]
    fn classifies_control_frames() {
        assert_eq!(parse_frame("pong", CANDLE), FeedFrame::Pong);
        assert_eq!(parse_frame("not json", CANDLE), FeedFrame::Ignored);

        let FeedFrame::Event(login) = parse_frame(r#"{"event":"login","code":"0","msg":""}"#, CANDLE)
        else {
            panic!("expected event");
        };
        assert!(login.is_login_ok());

        let FeedFrame::Event(error) =
            parse_frame(r#"{"event":"error","code":"60009","msg":"Login failed."}"#, CANDLE)
        else {
            panic!("expected event");
        };
        assert!(error.is_error());
        assert!(!error.is_login_ok());
    }

    #[test]
    fn subscribe_frame_omits_absent_fields() {
        let frame = subscribe_frame(&[
            SubscriptionArg::positions("SWAP"),
            SubscriptionArg::candle("candle1H", "BTC-USDT-SWAP"),
        ]);
        assert_eq!(
            frame,
            serde_json::json!({
                "op": "subscribe",
                "args": [
                    {"channel": "positions", "instType": "SWAP"},
                    {"channel": "candle1H", "instId": "BTC-USDT-SWAP"}
                ]
            })
        );
    }
}
