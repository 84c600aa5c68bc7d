//! Property tests for engine invariants.
//!
//! Uses proptest to verify:
//! 1. Aggregation — OHLCV folding for partial and full windows
//! 2. Split invariant — both parts meet at the split price and stay valid
//! 3. Matcher termination — fills follow insertion order and the loop ends
//! 4. Skip monotonicity — the chosen window is safe or a single minute
//! 5. Liquidation idempotence — a second evaluation never fires again

use proptest::prelude::*;
use replaylab_core::data::MarketCandles;
use replaylab_core::domain::{
    Candle, ExchangeSettings, MarginMode, MarketKey, OrderSide, Position, Timeframe,
};
use replaylab_core::engine::{
    aggregate, liquidation, matcher, scheduler, split_candle, SimulationContext,
};

fn key() -> MarketKey {
    MarketKey::new("Sandbox", "BTC-USDT")
}

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_candle() -> impl Strategy<Value = Candle> {
    (50.0..150.0_f64, 50.0..150.0_f64, 0.0..5.0_f64, 0.0..5.0_f64, 0.0..100.0_f64).prop_map(
        |(open, close, up, down, volume)| Candle {
            timestamp: 0,
            open,
            close,
            high: open.max(close) + up,
            low: open.min(close) - down,
            volume,
        },
    )
}

/// Contiguous 1-minute series: each candle opens at the previous close.
fn arb_series(max_len: usize) -> impl Strategy<Value = Vec<Candle>> {
    prop::collection::vec((-1.0..1.0_f64, 0.0..1.0_f64, 0.0..1.0_f64), 1..max_len).prop_map(
        |moves| {
            let mut price = 100.0;
            moves
                .into_iter()
                .enumerate()
                .map(|(i, (delta, up, down))| {
                    let open = price;
                    let close = open + delta;
                    price = close;
                    Candle::new(
                        i as i64 * 60_000,
                        open,
                        close,
                        open.max(close) + up,
                        open.min(close) - down,
                        1.0,
                    )
                })
                .collect()
        },
    )
}

// ── 1. Aggregation ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn partial_aggregate_folds_ohlcv(series in arb_series(60)) {
        let c = aggregate(Timeframe::H1, &series, true).unwrap();
        prop_assert_eq!(c.timestamp, series[0].timestamp);
        prop_assert_eq!(c.open, series[0].open);
        prop_assert_eq!(c.close, series[series.len() - 1].close);
        prop_assert!(series.iter().all(|m| m.high <= c.high && m.low >= c.low));
        prop_assert!(series.iter().any(|m| m.high == c.high));
        prop_assert!(series.iter().any(|m| m.low == c.low));
        let volume: f64 = series.iter().map(|m| m.volume).sum();
        prop_assert!((c.volume - volume).abs() < 1e-9);
        prop_assert!(c.validate().is_ok());
    }

    #[test]
    fn strict_aggregate_requires_exact_length(series in arb_series(20)) {
        let result = aggregate(Timeframe::M15, &series, false);
        prop_assert_eq!(result.is_ok(), series.len() == 15);
    }
}

// ── 2. Split invariant ───────────────────────────────────────────────

proptest! {
    #[test]
    fn split_parts_meet_at_price(candle in arb_candle(), t in 0.0..=1.0_f64) {
        let price = (candle.low + (candle.high - candle.low) * t).clamp(candle.low, candle.high);
        let (filled, rest) = split_candle(&candle, price);

        prop_assert_eq!(filled.close, price);
        prop_assert_eq!(rest.open, price);
        prop_assert_eq!(filled.open, candle.open);
        prop_assert_eq!(rest.close, candle.close);
        prop_assert!(filled.validate().is_ok(), "filled {:?}", filled);
        prop_assert!(rest.validate().is_ok(), "rest {:?}", rest);
        prop_assert!(filled.high.max(rest.high) <= candle.high);
        prop_assert!(filled.low.min(rest.low) >= candle.low);
        prop_assert!(filled.volume >= 0.0 && rest.volume >= -1e-9);
        prop_assert!((filled.volume + rest.volume - candle.volume).abs() < 1e-9);
    }
}

// ── 3. Matcher termination ───────────────────────────────────────────

proptest! {
    #[test]
    fn matcher_fills_in_insertion_order_and_terminates(
        candle in arb_candle(),
        prices in prop::collection::vec(40.0..160.0_f64, 0..8),
    ) {
        let mut ctx = SimulationContext::new(ExchangeSettings::default(), 0, 8);
        let mut ids = Vec::new();
        for (i, price) in prices.iter().enumerate() {
            let side = if i % 2 == 0 { OrderSide::Buy } else { OrderSide::Sell };
            ids.push(ctx.limit_order(&key(), side, 1.0, *price).unwrap());
        }
        let candle = Candle { timestamp: 60_000, ..candle };
        let report = matcher::simulate_price_change(&mut ctx, &key(), &candle, &candle).unwrap();

        // a fill narrows the remaining path, so orders it passed may stay active
        let inside = prices.iter().filter(|p| candle.includes_price(**p)).count();
        prop_assert!(report.fills.len() <= inside);
        prop_assert_eq!(ctx.orders.count_active(&key()), prices.len() - report.fills.len());
        prop_assert_eq!(report.stored.len(), report.fills.len() + 1);
        prop_assert_eq!(ctx.candles.current(&key(), Timeframe::M1), Some(&candle));
        for fill in &report.fills {
            prop_assert!(candle.includes_price(fill.price));
        }
        // insertion order decides who fills first
        let first_inside = prices
            .iter()
            .zip(&ids)
            .find(|(p, _)| candle.includes_price(**p))
            .map(|(_, id)| *id);
        prop_assert_eq!(report.fills.first().map(|f| f.order_id), first_inside);
        for view in &report.stored {
            prop_assert!(view.validate().is_ok());
        }
    }
}

// ── 4. Skip monotonicity ─────────────────────────────────────────────

proptest! {
    #[test]
    fn skip_is_safe_or_single_minute(
        series in arb_series(120),
        prices in prop::collection::vec(90.0..110.0_f64, 0..6),
        max_skip in 1usize..120,
    ) {
        let markets = vec![MarketCandles::new(key(), series)];
        let mut ctx = SimulationContext::new(ExchangeSettings::default(), 0, 0);
        for price in &prices {
            ctx.limit_order(&key(), OrderSide::Buy, 1.0, *price).unwrap();
        }

        let skip = scheduler::next_skip(&markets, &ctx.orders, 0, max_skip);
        prop_assert!(skip >= 1);
        prop_assert!(skip <= max_skip);
        prop_assert!(
            skip == 1 || scheduler::count_candidates(&markets, &ctx.orders, 0, skip) < 2
        );
    }
}

// ── 5. Liquidation idempotence ───────────────────────────────────────

proptest! {
    #[test]
    fn liquidation_never_fires_twice(
        candle in arb_candle(),
        qty in 0.1..10.0_f64,
        long in any::<bool>(),
    ) {
        let mut ctx = SimulationContext::new(ExchangeSettings::default(), 0, 0);
        let mut position = Position::new(&key(), 5.0, MarginMode::Isolated, 0.01);
        position.qty = if long { qty } else { -qty };
        position.entry_price = (candle.low + candle.high) / 2.0;
        position.refresh_risk_prices();
        let liquidation_price = position.liquidation_price;
        ctx.portfolio.positions.insert(key(), position);

        let first = liquidation::liquidate(&mut ctx, &key(), &candle).unwrap();
        prop_assert_eq!(first, candle.includes_price(liquidation_price));
        let second = liquidation::liquidate(&mut ctx, &key(), &candle).unwrap();
        prop_assert!(!second);
        prop_assert_eq!(ctx.total_liquidations, usize::from(first));
    }
}
