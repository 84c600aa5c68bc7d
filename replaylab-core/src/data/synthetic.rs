//! Seeded random-walk candle generator for benchmarks, tests and demo runs.
//!
//! Each market gets its own sub-seed derived by hashing the master seed with
//! the market key, so the series for one market does not depend on which
//! other markets are generated or in what order.

use super::provider::{CandleSource, DataError};
use crate::domain::{Candle, MarketKey, ONE_MINUTE_MS};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone)]
pub struct SyntheticSource {
    pub seed: u64,
    pub start_price: f64,
    /// Maximum relative move per minute (0.001 = 0.1%).
    pub volatility: f64,
}

impl SyntheticSource {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            start_price: 100.0,
            volatility: 0.001,
        }
    }

    fn sub_seed(&self, key: &MarketKey) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.seed.to_le_bytes());
        hasher.update(key.exchange.as_bytes());
        hasher.update(key.symbol.as_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(bytes)
    }
}

impl CandleSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(&self, key: &MarketKey, start_ms: i64, end_ms: i64) -> Result<Vec<Candle>, DataError> {
        if end_ms < start_ms {
            return Err(DataError::InvalidRange {
                key: key.clone(),
                start: start_ms,
                end: end_ms,
            });
        }
        let count = ((end_ms - start_ms) / ONE_MINUTE_MS + 1) as usize;
        let mut rng = StdRng::seed_from_u64(self.sub_seed(key));
        Ok(random_walk(
            &mut rng,
            start_ms,
            count,
            self.start_price,
            self.volatility,
        ))
    }
}

/// `count` contiguous 1-minute candles starting at `start_ms`.
///
/// Each candle opens at the previous close, so the series has no open gaps.
pub fn random_walk(
    rng: &mut impl Rng,
    start_ms: i64,
    count: usize,
    start_price: f64,
    volatility: f64,
) -> Vec<Candle> {
    let mut candles = Vec::with_capacity(count);
    let mut price = start_price;
    for i in 0..count {
        let open = price;
        let close = (open * (1.0 + rng.gen_range(-volatility..=volatility))).max(0.01);
        let wick_up = open.max(close) * rng.gen_range(0.0..=volatility);
        let wick_down = open.min(close) * rng.gen_range(0.0..=volatility);
        candles.push(Candle {
            timestamp: start_ms + i as i64 * ONE_MINUTE_MS,
            open,
            close,
            high: open.max(close) + wick_up,
            low: (open.min(close) - wick_down).max(0.0),
            volume: rng.gen_range(1.0..100.0),
        });
        price = close;
    }
    candles
}
