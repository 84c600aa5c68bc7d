//! Timeframe aggregation — fold contiguous 1-minute candles into one candle.
//!
//! Pure functions: nothing here touches the candle store or the order book.

use crate::domain::{Candle, Timeframe};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregateError {
    #[error("cannot aggregate an empty window")]
    EmptyWindow,

    #[error("{timeframe} candle needs exactly {expected} one-minute candles, got {actual}")]
    WrongWindowLength {
        timeframe: Timeframe,
        expected: usize,
        actual: usize,
    },

    #[error("forming {timeframe} candle cannot span {actual} minutes (max {max})")]
    WindowTooLong {
        timeframe: Timeframe,
        max: usize,
        actual: usize,
    },
}

/// Aggregate a window of 1-minute candles into one `timeframe` candle.
///
/// With `allow_partial == false` the window must hold exactly
/// `timeframe.minutes()` candles. With `allow_partial == true` any non-empty
/// window up to that length is accepted and the result is a forming candle.
pub fn aggregate(
    timeframe: Timeframe,
    window: &[Candle],
    allow_partial: bool,
) -> Result<Candle, AggregateError> {
    let expected = timeframe.minutes();
    if window.is_empty() {
        return Err(AggregateError::EmptyWindow);
    }
    if allow_partial {
        if window.len() > expected {
            return Err(AggregateError::WindowTooLong {
                timeframe,
                max: expected,
                actual: window.len(),
            });
        }
    } else if window.len() != expected {
        return Err(AggregateError::WrongWindowLength {
            timeframe,
            expected,
            actual: window.len(),
        });
    }
    forming(window)
}

/// Aggregate any non-empty window regardless of timeframe bounds.
///
/// Used for the "as-of-now" candle of a skip window, which is bounded by the
/// scheduler rather than by a timeframe.
pub fn forming(window: &[Candle]) -> Result<Candle, AggregateError> {
    let (first, last) = match (window.first(), window.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Err(AggregateError::EmptyWindow),
    };

    let mut high = f64::NEG_INFINITY;
    let mut low = f64::INFINITY;
    let mut volume = 0.0;
    for c in window {
        high = high.max(c.high);
        low = low.min(c.low);
        volume += c.volume;
    }

    Ok(Candle {
        timestamp: first.timestamp,
        open: first.open,
        close: last.close,
        high,
        low,
        volume,
    })
}
