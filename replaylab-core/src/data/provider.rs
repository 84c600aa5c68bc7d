//! Candle source trait and structured error types.
//!
//! A `CandleSource` supplies gap-free, sorted 1-minute candles for one market
//! over an inclusive millisecond range. CSV files, synthetic generators and
//! in-memory fixtures all sit behind it, so the driver never knows where data
//! came from.

use crate::domain::{Candle, MarketKey};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("no candles available for {key}")]
    MarketNotFound { key: MarketKey },

    #[error("{key}: requested range [{start}, {end}] is empty or reversed")]
    InvalidRange { key: MarketKey, start: i64, end: i64 },

    #[error("{key}: expected {expected} candles, got {actual}")]
    WrongLength {
        key: MarketKey,
        expected: usize,
        actual: usize,
    },

    #[error("{key}: first candle at {actual}, expected {expected}")]
    WrongStart {
        key: MarketKey,
        expected: i64,
        actual: i64,
    },

    #[error("{key}: last candle at {actual}, expected {expected}")]
    WrongEnd {
        key: MarketKey,
        expected: i64,
        actual: i64,
    },

    #[error("{key}: gap after candle {index} ({previous} → {next})")]
    Gap {
        key: MarketKey,
        index: usize,
        previous: i64,
        next: i64,
    },

    #[error("{key}: invalid candle at {timestamp}: {reason}")]
    InvalidCandle {
        key: MarketKey,
        timestamp: i64,
        reason: String,
    },

    #[error("I/O error reading {path}: {message}")]
    Io { path: String, message: String },

    #[error("parse error in {path}: {message}")]
    Parse { path: String, message: String },
}

/// Source of historical 1-minute candles.
pub trait CandleSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// 1-minute candles for `key` whose timestamps lie in `[start_ms, end_ms]`.
    ///
    /// Implementations return what they have; range and gap validation is the
    /// caller's job (see [`super::validate`]).
    fn fetch(&self, key: &MarketKey, start_ms: i64, end_ms: i64) -> Result<Vec<Candle>, DataError>;
}

/// Candles held in memory, keyed by market.
#[derive(Debug, Default, Clone)]
pub struct InMemorySource {
    series: HashMap<MarketKey, Vec<Candle>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: MarketKey, candles: Vec<Candle>) {
        self.series.insert(key, candles);
    }
}

impl CandleSource for InMemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    fn fetch(&self, key: &MarketKey, start_ms: i64, end_ms: i64) -> Result<Vec<Candle>, DataError> {
        let candles = self
            .series
            .get(key)
            .ok_or_else(|| DataError::MarketNotFound { key: key.clone() })?;
        Ok(candles
            .iter()
            .filter(|c| c.timestamp >= start_ms && c.timestamp <= end_ms)
            .copied()
            .collect())
    }
}
