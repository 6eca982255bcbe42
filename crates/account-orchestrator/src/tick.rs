//! Poll-driven evaluation: fetch positions, candle direction and last price
//! per symbol over REST instead of waiting for feed pushes.

use position_guard_core::{
    inst_id_to_symbol, symbol_to_inst_id, ApiCredentials, CandleDirection, MarketSnapshotSource,
    PositionSnapshot,
};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, warn};

use crate::engine::EvaluationRecord;

/// Market data for one symbol gathered by a tick pass.
#[derive(Debug, Clone)]
pub struct SymbolSample {
    pub symbol: String,
    pub inst_id: String,
    /// Open positions; a single flat placeholder when there are none.
    pub positions: Vec<PositionSnapshot>,
    pub direction: Option<CandleDirection>,
    pub last_price: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolError {
    pub symbol: String,
    pub error: String,
}

/// Outcome of one tick pass, returned to the caller.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    pub account_id: String,
    pub symbols: Vec<String>,
    pub evaluations: Vec<EvaluationRecord>,
    pub dispatched: usize,
    pub errors: Vec<SymbolError>,
}

/// Symbols to poll: running symbols, narrowed by an optional filter that may
/// name symbols (`BTC/USDT:USDT`) or instrument ids (`BTC-USDT-SWAP`).
#[must_use]
pub fn select_symbols(running: &[String], only: Option<&[String]>) -> Vec<String> {
    let Some(only) = only.filter(|only| !only.is_empty()) else {
        return running.to_vec();
    };
    let wanted: Vec<String> = only
        .iter()
        .map(|entry| inst_id_to_symbol(entry).unwrap_or_else(|| entry.clone()))
        .collect();
    running
        .iter()
        .filter(|symbol| wanted.contains(*symbol))
        .cloned()
        .collect()
}

/// Fetches one sample per symbol. Symbols whose reads fail are reported and
/// skipped; the rest of the pass continues.
pub async fn collect_samples(
    source: &dyn MarketSnapshotSource,
    credentials: &ApiCredentials,
    symbols: &[String],
) -> (Vec<SymbolSample>, Vec<SymbolError>) {
    let mut samples = Vec::with_capacity(symbols.len());
    let mut errors = Vec::new();

    for symbol in symbols {
        let Some(inst_id) = symbol_to_inst_id(symbol) else {
            warn!(%symbol, "Symbol has no instrument mapping, skipping");
            errors.push(SymbolError {
                symbol: symbol.clone(),
                error: "unsupported symbol".to_string(),
            });
            continue;
        };

        match sample_symbol(source, credentials, symbol, &inst_id).await {
            Ok(sample) => {
                debug!(
                    %symbol,
                    positions = sample.positions.len(),
                    direction = ?sample.direction,
                    last_price = ?sample.last_price,
                    "Sampled symbol"
                );
                samples.push(sample);
            }
            Err(e) => {
                warn!(%symbol, error = %e, "Tick sampling failed");
                errors.push(SymbolError {
                    symbol: symbol.clone(),
                    error: format!("{e:#}"),
                });
            }
        }
    }

    (samples, errors)
}

async fn sample_symbol(
    source: &dyn MarketSnapshotSource,
    credentials: &ApiCredentials,
    symbol: &str,
    inst_id: &str,
) -> anyhow::Result<SymbolSample> {
    let mut positions = source.positions(credentials, inst_id).await?;
    positions.retain(|position| !position.is_flat());
    if positions.is_empty() {
        positions.push(PositionSnapshot::flat(inst_id, symbol));
    }
    let direction = source.candle_direction(inst_id).await?;
    let last_price = source.last_price(inst_id).await?;

    Ok(SymbolSample {
        symbol: symbol.to_string(),
        inst_id: inst_id.to_string(),
        positions,
        direction,
        last_price,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticMarket;
    use position_guard_core::PosSide;
    use rust_decimal_macros::dec;

    fn running() -> Vec<String> {
        vec!["BTC/USDT:USDT".to_string(), "ETH/USDT:USDT".to_string()]
    }

    #[test]
    fn filter_accepts_symbols_and_inst_ids() {
        assert_eq!(select_symbols(&running(), None), running());
        assert_eq!(select_symbols(&running(), Some(&[])), running());
        assert_eq!(
            select_symbols(&running(), Some(&["ETH-USDT-SWAP".to_string()])),
            vec!["ETH/USDT:USDT".to_string()]
        );
        assert_eq!(
            select_symbols(
                &running(),
                Some(&["BTC/USDT:USDT".to_string(), "SOL/USDT:USDT".to_string()])
            ),
            vec!["BTC/USDT:USDT".to_string()]
        );
    }

    #[tokio::test]
    async fn flat_symbols_get_placeholder_and_failures_are_isolated() {
        let mut market = StaticMarket::default();
        market.positions.insert(
            "BTC-USDT-SWAP".to_string(),
            vec![PositionSnapshot {
                inst_id: "BTC-USDT-SWAP".to_string(),
                symbol: "BTC/USDT:USDT".to_string(),
                pos_side: PosSide::Short,
                size: dec!(3),
                upl_ratio: 0.01,
                mark_price: None,
            }],
        );
        market
            .directions
            .insert("BTC-USDT-SWAP".to_string(), CandleDirection::Up);
        market.prices.insert("BTC-USDT-SWAP".to_string(), dec!(64000));
        market.failing.push("ETH-USDT-SWAP".to_string());

        let credentials = ApiCredentials::new("acc-1", "k", "s", "p");
        let symbols = vec![
            "BTC/USDT:USDT".to_string(),
            "ETH/USDT:USDT".to_string(),
            "BTC/USD".to_string(),
        ];
        let (samples, errors) = collect_samples(&market, &credentials, &symbols).await;

        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].positions[0].size, dec!(3));
        assert_eq!(samples[0].direction, Some(CandleDirection::Up));
        assert_eq!(samples[0].last_price, Some(dec!(64000)));
        assert_eq!(errors.len(), 2);

        let market = StaticMarket::default();
        let (samples, _) =
            collect_samples(&market, &credentials, &["SOL/USDT:USDT".to_string()]).await;
        assert!(samples[0].positions[0].is_flat());
        assert_eq!(samples[0].positions[0].inst_id, "SOL-USDT-SWAP");
    }
}
