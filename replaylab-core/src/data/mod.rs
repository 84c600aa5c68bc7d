//! Candle sources, validation and time helpers

pub mod provider;
pub mod synthetic;
pub mod validate;

pub use provider::{CandleSource, DataError, InMemorySource};
pub use synthetic::SyntheticSource;
pub use validate::{expected_len, validate_bounds, validate_contiguous};

use crate::domain::{Candle, MarketKey};
use chrono::{DateTime, NaiveDate, Utc};

/// The full 1-minute series of one market for a simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketCandles {
    pub key: MarketKey,
    pub candles: Vec<Candle>,
}

impl MarketCandles {
    pub fn new(key: MarketKey, candles: Vec<Candle>) -> Self {
        Self { key, candles }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }
}

/// Milliseconds since the epoch at 00:00 UTC of `date`.
pub fn date_to_ms(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp_millis())
        .unwrap_or_default()
}

/// UTC date containing the timestamp, if representable.
pub fn ms_to_date(ms: i64) -> Option<NaiveDate> {
    DateTime::<Utc>::from_timestamp_millis(ms).map(|dt| dt.date_naive())
}
