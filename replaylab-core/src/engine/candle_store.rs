//! Candle store — append-only candle arrays per (market, timeframe).
//!
//! Timestamps within one series are strictly increasing. The only in-place
//! write allowed is re-storing the newest slot with the same timestamp, which
//! is how the price-path matcher publishes progressive views of the minute it
//! is resolving before the real candle is committed.

use crate::domain::{Candle, MarketKey, Timeframe};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CandleStoreError {
    #[error("{key} {timeframe}: candle at {timestamp} is older than the newest stored candle at {last}")]
    TimestampRegression {
        key: MarketKey,
        timeframe: Timeframe,
        timestamp: i64,
        last: i64,
    },
}

pub struct CandleStore {
    series: HashMap<(MarketKey, Timeframe), Vec<Candle>>,
    capacity_hint: usize,
}

impl CandleStore {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Pre-size every new series for `capacity` candles.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            series: HashMap::new(),
            capacity_hint: capacity,
        }
    }

    /// Append a candle, or replace the newest one when timestamps match.
    pub fn add_candle(
        &mut self,
        key: &MarketKey,
        timeframe: Timeframe,
        candle: Candle,
    ) -> Result<(), CandleStoreError> {
        let capacity = self.capacity_hint;
        let series = self
            .series
            .entry((key.clone(), timeframe))
            .or_insert_with(|| Vec::with_capacity(capacity));

        match series.last_mut() {
            None => series.push(candle),
            Some(last) if last.timestamp == candle.timestamp => *last = candle,
            Some(last) if last.timestamp < candle.timestamp => series.push(candle),
            Some(last) => {
                return Err(CandleStoreError::TimestampRegression {
                    key: key.clone(),
                    timeframe,
                    timestamp: candle.timestamp,
                    last: last.timestamp,
                })
            }
        }
        Ok(())
    }

    pub fn add_candles(
        &mut self,
        key: &MarketKey,
        timeframe: Timeframe,
        candles: &[Candle],
    ) -> Result<(), CandleStoreError> {
        for candle in candles {
            self.add_candle(key, timeframe, *candle)?;
        }
        Ok(())
    }

    pub fn candles(&self, key: &MarketKey, timeframe: Timeframe) -> &[Candle] {
        self.series
            .get(&(key.clone(), timeframe))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The newest candle of a series.
    pub fn current(&self, key: &MarketKey, timeframe: Timeframe) -> Option<&Candle> {
        self.candles(key, timeframe).last()
    }

    pub fn len(&self, key: &MarketKey, timeframe: Timeframe) -> usize {
        self.candles(key, timeframe).len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.values().all(Vec::is_empty)
    }
}

impl Default for CandleStore {
    fn default() -> Self {
        Self::new()
    }
}
