use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::types::StrategyConfig;

/// Strategies of one account grouped by symbol.
///
/// The mapping is only ever swapped as a whole, so readers never see a mix of
/// two refreshes.
#[derive(Debug, Default, Clone)]
pub struct StrategyRegistry {
    by_symbol: HashMap<String, Vec<StrategyConfig>>,
    refreshed_at: Option<DateTime<Utc>>,
}

impl StrategyRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole mapping. Order within a symbol follows the input.
    pub fn replace(&mut self, strategies: Vec<StrategyConfig>, now: DateTime<Utc>) {
        let mut by_symbol: HashMap<String, Vec<StrategyConfig>> = HashMap::new();
        for strategy in strategies {
            by_symbol
                .entry(strategy.symbol.clone())
                .or_default()
                .push(strategy);
        }
        self.by_symbol = by_symbol;
        self.refreshed_at = Some(now);
    }

    #[must_use]
    pub fn for_symbol(&self, symbol: &str) -> &[StrategyConfig] {
        self.by_symbol
            .get(symbol)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// All mapped symbols, sorted.
    #[must_use]
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.by_symbol.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Symbols with at least one running strategy, sorted.
    #[must_use]
    pub fn running_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self
            .by_symbol
            .iter()
            .filter(|(_, strategies)| strategies.iter().any(StrategyConfig::is_running))
            .map(|(symbol, _)| symbol.clone())
            .collect();
        symbols.sort();
        symbols
    }

    #[must_use]
    pub fn strategy_count(&self) -> usize {
        self.by_symbol.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_symbol.is_empty()
    }

    #[must_use]
    pub const fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }

    pub fn clear(&mut self) {
        self.by_symbol.clear();
        self.refreshed_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MarginMode, StrategyStatus};

    fn strategy(id: &str, symbol: &str, status: StrategyStatus) -> StrategyConfig {
        StrategyConfig {
            id: id.to_string(),
            account_id: "acc".to_string(),
            symbol: symbol.to_string(),
            status,
            profit_ratio: 0.05,
            loss_stop_ratio: 0.1,
            margin_mode: MarginMode::Cross,
            range_low: None,
            range_high: None,
            entry_size: None,
            auto_restart_on_price_return: false,
            signal_type: None,
        }
    }

    #[test]
    fn groups_by_symbol_preserving_order() {
        let mut registry = StrategyRegistry::new();
        registry.replace(
            vec![
                strategy("a", "BTC/USDT:USDT", StrategyStatus::Running),
                strategy("b", "ETH/USDT:USDT", StrategyStatus::Paused),
                strategy("c", "BTC/USDT:USDT", StrategyStatus::Paused),
            ],
            Utc::now(),
        );

        let btc: Vec<&str> = registry
            .for_symbol("BTC/USDT:USDT")
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(btc, vec!["a", "c"]);
        assert_eq!(registry.strategy_count(), 3);
        assert_eq!(registry.symbols(), vec!["BTC/USDT:USDT", "ETH/USDT:USDT"]);
        assert_eq!(registry.running_symbols(), vec!["BTC/USDT:USDT"]);
    }

    #[test]
    fn replace_drops_previous_mapping() {
        let mut registry = StrategyRegistry::new();
        registry.replace(
            vec![strategy("a", "BTC/USDT:USDT", StrategyStatus::Running)],
            Utc::now(),
        );
        registry.replace(
            vec![strategy("b", "SOL/USDT:USDT", StrategyStatus::Running)],
            Utc::now(),
        );

        assert!(registry.for_symbol("BTC/USDT:USDT").is_empty());
        assert_eq!(registry.for_symbol("SOL/USDT:USDT").len(), 1);
    }

    #[test]
    fn empty_refresh_clears_symbols() {
        let mut registry = StrategyRegistry::new();
        registry.replace(Vec::new(), Utc::now());
        assert!(registry.is_empty());
        assert!(registry.symbols().is_empty());
        assert!(registry.refreshed_at().is_some());
    }
}
