//! Price-path matcher — resolve every fill one candle's excursion triggers.
//!
//! The intra-minute path is inferred from OHLC: `Open → Low → High → Close`
//! for bullish or flat candles, `Open → High → Low → Close` for bearish ones.
//! The first active order in book (insertion) order whose price lies inside
//! the remaining range fills first; the candle is split at that price and
//! the continuation is matched again until nothing more triggers.
//!
//! While matching, the last 1-minute slot of the store holds a progressive
//! view of the price action resolved so far, so a strategy or the liquidation
//! monitor never observes prices the path has not reached yet. The real
//! candle replaces the view once matching is done.

use super::aggregator;
use super::context::SimulationContext;
use super::error::SimulationError;
use super::liquidation;
use crate::domain::{Candle, CompletedTrade, MarketKey, OrderId, Timeframe};

/// One fill produced while resolving a candle.
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub order_id: OrderId,
    pub price: f64,
    pub trade: Option<CompletedTrade>,
}

/// What happened while resolving one candle for one market.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchReport {
    pub fills: Vec<Fill>,
    /// Candles written to the 1m slot, the committed real candle last.
    pub stored: Vec<Candle>,
    pub liquidations: usize,
}

/// Inferred intra-candle price path (four waypoints).
pub fn price_path(candle: &Candle) -> [f64; 4] {
    if candle.is_bullish() {
        [candle.open, candle.low, candle.high, candle.close]
    } else {
        [candle.open, candle.high, candle.low, candle.close]
    }
}

/// Split `candle` where its path first reaches `price`.
///
/// Returns `(filled_part, continuation)`. `filled_part.close` and
/// `continuation.open` both equal `price` (clamped into `[low, high]`); each
/// part's extremes are those visited on its side of the split. Both parts
/// keep the candle's timestamp.
pub fn split_candle(candle: &Candle, price: f64) -> (Candle, Candle) {
    let price = price.clamp(candle.low, candle.high);
    let path = price_path(candle);

    let segment = path
        .windows(2)
        .position(|w| price >= w[0].min(w[1]) && price <= w[0].max(w[1]))
        .unwrap_or(1);

    let before = &path[..=segment];
    let after = &path[segment + 1..];

    let extremes = |points: &[f64]| {
        points
            .iter()
            .fold((price, price), |(lo, hi), &p| (lo.min(p), hi.max(p)))
    };
    let (filled_low, filled_high) = extremes(before);
    let (rest_low, rest_high) = extremes(after);

    let travelled = path_length(before) + (price - path[segment]).abs();
    let total = path_length(&path);
    let filled_volume = if total > 0.0 {
        candle.volume * travelled / total
    } else {
        candle.volume
    };

    let filled = Candle {
        timestamp: candle.timestamp,
        open: candle.open,
        close: price,
        high: filled_high,
        low: filled_low,
        volume: filled_volume,
    };
    let continuation = Candle {
        timestamp: candle.timestamp,
        open: price,
        close: candle.close,
        high: rest_high,
        low: rest_low,
        volume: candle.volume - filled_volume,
    };
    (filled, continuation)
}

fn path_length(points: &[f64]) -> f64 {
    points.windows(2).map(|w| (w[1] - w[0]).abs()).sum()
}

/// Resolve all fills `step_candle` triggers on `key`, then commit `commit_candle`.
///
/// `step_candle` is the window's forming candle stamped with the timestamp of
/// the window's last minute; `commit_candle` is that last real 1-minute
/// candle. Each fill re-runs the liquidation check against the filled part,
/// and the check runs once more against the whole step candle at the end.
pub fn simulate_price_change(
    ctx: &mut SimulationContext,
    key: &MarketKey,
    step_candle: &Candle,
    commit_candle: &Candle,
) -> Result<MatchReport, SimulationError> {
    let mut report = MatchReport::default();
    let mut remaining = *step_candle;
    let mut view: Option<Candle> = None;

    while let Some((order_id, price)) = ctx
        .orders
        .first_triggered(key, remaining.low, remaining.high)
        .map(|o| (o.id, o.price))
    {
        let (filled, continuation) = split_candle(&remaining, price);

        let next_view = match view {
            Some(prev) => aggregator::forming(&[prev, filled])?,
            None => filled,
        };
        ctx.candles.add_candle(key, Timeframe::M1, next_view)?;
        report.stored.push(next_view);
        view = Some(next_view);

        ctx.portfolio.position_mut(key).current_price = price;
        let trade = ctx.execute_order(key, order_id, price)?;
        report.fills.push(Fill {
            order_id,
            price,
            trade,
        });

        if liquidation::liquidate(ctx, key, &filled)? {
            report.liquidations += 1;
        }
        remaining = continuation;
    }

    ctx.candles.add_candle(key, Timeframe::M1, *commit_candle)?;
    report.stored.push(*commit_candle);
    ctx.portfolio.position_mut(key).current_price = commit_candle.close;

    if liquidation::liquidate(ctx, key, step_candle)? {
        report.liquidations += 1;
    }
    Ok(report)
}
