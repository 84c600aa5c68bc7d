//! Precondition checks on loaded 1-minute candle series.

use super::provider::DataError;
use crate::domain::{Candle, MarketKey, ONE_MINUTE_MS};

/// Number of 1-minute candles in the inclusive range `[start_ms, end_ms]`.
pub fn expected_len(start_ms: i64, end_ms: i64) -> usize {
    if end_ms < start_ms {
        return 0;
    }
    ((end_ms - start_ms) / ONE_MINUTE_MS + 1) as usize
}

/// Check that `candles` covers exactly `[start_ms, end_ms]`.
pub fn validate_bounds(
    key: &MarketKey,
    candles: &[Candle],
    start_ms: i64,
    end_ms: i64,
) -> Result<(), DataError> {
    if end_ms < start_ms {
        return Err(DataError::InvalidRange {
            key: key.clone(),
            start: start_ms,
            end: end_ms,
        });
    }
    let (first, last) = match (candles.first(), candles.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Err(DataError::MarketNotFound { key: key.clone() }),
    };
    if first.timestamp != start_ms {
        return Err(DataError::WrongStart {
            key: key.clone(),
            expected: start_ms,
            actual: first.timestamp,
        });
    }
    if last.timestamp != end_ms {
        return Err(DataError::WrongEnd {
            key: key.clone(),
            expected: end_ms,
            actual: last.timestamp,
        });
    }
    let expected = expected_len(start_ms, end_ms);
    if candles.len() != expected {
        return Err(DataError::WrongLength {
            key: key.clone(),
            expected,
            actual: candles.len(),
        });
    }
    Ok(())
}

/// Check that consecutive candles are exactly one minute apart and each one
/// satisfies the OHLC ordering invariant.
pub fn validate_contiguous(key: &MarketKey, candles: &[Candle]) -> Result<(), DataError> {
    for candle in candles {
        candle.validate().map_err(|e| DataError::InvalidCandle {
            key: key.clone(),
            timestamp: candle.timestamp,
            reason: e.to_string(),
        })?;
    }
    for (index, pair) in candles.windows(2).enumerate() {
        if pair[1].timestamp - pair[0].timestamp != ONE_MINUTE_MS {
            return Err(DataError::Gap {
                key: key.clone(),
                index,
                previous: pair[0].timestamp,
                next: pair[1].timestamp,
            });
        }
    }
    Ok(())
}
