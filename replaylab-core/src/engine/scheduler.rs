//! Skip-ahead scheduler — how many minutes the driver may consume in one step.
//!
//! A step resolves fills against the forming candle of its whole window, so
//! a window is only safe when at most one order could be touched inside it.
//! The window is halved until that holds or it is down to one minute.

use super::aggregator;
use super::order_book::OrderBook;
use crate::data::MarketCandles;

/// Largest window in `1..=max_skip` (halving from `max_skip`) that leaves
/// fewer than two candidate orders across all markets.
///
/// `cursor` is the number of 1-minute candles already consumed. Only markets
/// with at least two active orders are counted. Windows are clamped to the
/// available data.
pub fn next_skip(
    markets: &[MarketCandles],
    book: &OrderBook,
    cursor: usize,
    max_skip: usize,
) -> usize {
    let mut window = max_skip.max(1);
    while window > 1 {
        let candidates = count_candidates(markets, book, cursor, window);
        if candidates < 2 {
            break;
        }
        tracing::debug!(cursor, window, candidates, "halving skip window");
        window /= 2;
    }
    window
}

/// Active orders whose price lies inside the forming candle of
/// `candles[cursor..cursor + window]`, summed over markets with ≥ 2 active orders.
pub fn count_candidates(
    markets: &[MarketCandles],
    book: &OrderBook,
    cursor: usize,
    window: usize,
) -> usize {
    markets
        .iter()
        .filter(|m| book.count_active(&m.key) >= 2)
        .filter_map(|m| {
            let end = (cursor + window).min(m.candles.len());
            let slice = m.candles.get(cursor..end)?;
            let forming = aggregator::forming(slice).ok()?;
            Some(
                book.active_orders(&m.key)
                    .filter(|o| forming.includes_price(o.price))
                    .count(),
            )
        })
        .sum()
}
