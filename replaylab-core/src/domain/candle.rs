//! Candle — the fundamental market data unit.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Milliseconds in one minute; the resolution of every stored source candle.
pub const ONE_MINUTE_MS: i64 = 60_000;

/// OHLCV candle for a single symbol over one time bucket.
///
/// Field order on the wire is `[timestamp, open, close, high, low, volume]`
/// (see [`Candle::from_row`] / [`Candle::to_row`]). `timestamp` is the bucket
/// open time in milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub close: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
}

/// Violations of the OHLC ordering invariant.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CandleError {
    #[error("candle at {timestamp} has a NaN field")]
    NotANumber { timestamp: i64 },

    #[error("candle at {timestamp}: low {low} is above min(open, close) {body_low}")]
    LowAboveBody {
        timestamp: i64,
        low: f64,
        body_low: f64,
    },

    #[error("candle at {timestamp}: high {high} is below max(open, close) {body_high}")]
    HighBelowBody {
        timestamp: i64,
        high: f64,
        body_high: f64,
    },
}

impl Candle {
    pub fn new(timestamp: i64, open: f64, close: f64, high: f64, low: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            close,
            high,
            low,
            volume,
        }
    }

    /// Build a candle from a storage row `[timestamp, open, close, high, low, volume]`.
    pub fn from_row(row: [f64; 6]) -> Self {
        Self {
            timestamp: row[0] as i64,
            open: row[1],
            close: row[2],
            high: row[3],
            low: row[4],
            volume: row[5],
        }
    }

    /// Storage row in wire order.
    pub fn to_row(&self) -> [f64; 6] {
        [
            self.timestamp as f64,
            self.open,
            self.close,
            self.high,
            self.low,
            self.volume,
        ]
    }

    /// Check `low <= min(open, close) <= max(open, close) <= high`.
    pub fn validate(&self) -> Result<(), CandleError> {
        let fields = [self.open, self.close, self.high, self.low, self.volume];
        if fields.iter().any(|v| v.is_nan()) {
            return Err(CandleError::NotANumber {
                timestamp: self.timestamp,
            });
        }
        let body_low = self.open.min(self.close);
        let body_high = self.open.max(self.close);
        if self.low > body_low {
            return Err(CandleError::LowAboveBody {
                timestamp: self.timestamp,
                low: self.low,
                body_low,
            });
        }
        if self.high < body_high {
            return Err(CandleError::HighBelowBody {
                timestamp: self.timestamp,
                high: self.high,
                body_high,
            });
        }
        Ok(())
    }

    pub fn is_bullish(&self) -> bool {
        self.close >= self.open
    }

    /// Whether `price` lies inside the closed range `[low, high]`.
    ///
    /// NaN never matches, so a flat position's undefined liquidation price is
    /// never "included".
    pub fn includes_price(&self, price: f64) -> bool {
        price >= self.low && price <= self.high
    }

    /// Timestamp of the first minute after this candle, for a 1-minute candle.
    pub fn next_minute(&self) -> i64 {
        self.timestamp + ONE_MINUTE_MS
    }
}
