use super::ids::MarketKey;
use super::timeframe::Timeframe;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Static (exchange, symbol, timeframe) → strategy binding.
///
/// Set at simulation start and read-only during the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub exchange: String,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub strategy: String,
    /// Hyperparameters handed to the strategy factory.
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
}

impl Route {
    pub fn market_key(&self) -> MarketKey {
        MarketKey::new(self.exchange.clone(), self.symbol.clone())
    }
}

/// A candle subscription with no strategy attached (aggregated and stored only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraCandle {
    pub exchange: String,
    pub symbol: String,
    pub timeframe: Timeframe,
}

impl ExtraCandle {
    pub fn market_key(&self) -> MarketKey {
        MarketKey::new(self.exchange.clone(), self.symbol.clone())
    }
}
