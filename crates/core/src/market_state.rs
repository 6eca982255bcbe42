use std::collections::{BTreeMap, HashMap};

use crate::instrument;
use crate::types::{CandleDirection, CandleUpdate};

/// Latest hourly candle direction per symbol.
///
/// Entries are overwritten in place and never expire while the owning account
/// runs. A symbol with no entry has an unknown direction.
#[derive(Debug, Default, Clone)]
pub struct MarketStateCache {
    directions: HashMap<String, CandleDirection>,
}

impl MarketStateCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the direction carried by a candle update.
    ///
    /// Returns `None` when the instrument id does not map to a symbol.
    pub fn apply(&mut self, update: &CandleUpdate) -> Option<CandleDirection> {
        let symbol = instrument::inst_id_to_symbol(&update.inst_id)?;
        let direction = update.direction();
        self.directions.insert(symbol, direction);
        Some(direction)
    }

    pub fn set(&mut self, symbol: impl Into<String>, direction: CandleDirection) {
        self.directions.insert(symbol.into(), direction);
    }

    #[must_use]
    pub fn direction(&self, symbol: &str) -> Option<CandleDirection> {
        self.directions.get(symbol).copied()
    }

    /// Ordered copy for status reporting.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, CandleDirection> {
        self.directions
            .iter()
            .map(|(symbol, direction)| (symbol.clone(), *direction))
            .collect()
    }

    pub fn clear(&mut self) {
        self.directions.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.directions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.directions.is_empty()
    }
}
