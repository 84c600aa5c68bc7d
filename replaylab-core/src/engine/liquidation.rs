//! Liquidation monitor for isolated-margin positions.
//!
//! A position is liquidated when its liquidation price lies inside a candle's
//! range. The liquidation is a reduce-only market order for the full position,
//! filled immediately at the bankruptcy price.

use super::context::SimulationContext;
use super::error::SimulationError;
use crate::domain::{
    prepare_qty, Candle, IdGen, MarginMode, MarketKey, Order, OrderFlag, OrderKind, OrderRole,
    OrderStatus, Position,
};

/// Build the liquidation order for `position` if `candle` breaches it.
///
/// Returns `None` for cross margin, flat positions, or when the liquidation
/// price is outside `[candle.low, candle.high]`.
pub fn check(candle: &Candle, position: &Position, ids: &mut IdGen, now: i64) -> Option<Order> {
    if position.margin_mode != MarginMode::Isolated || !position.is_open() {
        return None;
    }
    if !candle.includes_price(position.liquidation_price) {
        return None;
    }
    let side = position.closing_side()?;
    Some(Order {
        id: ids.next_order_id(),
        exchange: position.exchange.clone(),
        symbol: position.symbol.clone(),
        side,
        kind: OrderKind::Market,
        flag: OrderFlag::ReduceOnly,
        role: OrderRole::ClosePosition,
        price: position.bankruptcy_price,
        qty: prepare_qty(position.qty.abs(), side),
        status: OrderStatus::Active,
        created_at: now,
        executed_at: None,
    })
}

/// Run the check for `key` against `candle` and execute the order if it fires.
///
/// Returns whether a liquidation happened.
pub fn liquidate(
    ctx: &mut SimulationContext,
    key: &MarketKey,
    candle: &Candle,
) -> Result<bool, SimulationError> {
    let now = ctx.now();
    let order = match ctx.portfolio.position(key) {
        Some(position) => check(candle, position, &mut ctx.ids, now),
        None => None,
    };
    let Some(order) = order else {
        return Ok(false);
    };

    let (id, price, qty) = (order.id, order.price, order.qty);
    ctx.orders.add(order);
    ctx.total_liquidations += 1;
    tracing::info!("{key}: liquidated {qty} at bankruptcy price {price} (order {id})");

    ctx.execute_order_inner(key, id, price, true)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExchangeSettings, OrderSide, PositionSide, Timeframe};

    fn key() -> MarketKey {
        MarketKey::new("Sandbox", "BTC-USDT")
    }

    fn long_position(liquidation_price: f64, bankruptcy_price: f64) -> Position {
        let mut p = Position::new(&key(), 2.0, MarginMode::Isolated, 0.0);
        p.qty = 3.0;
        p.entry_price = 100.0;
        p.liquidation_price = liquidation_price;
        p.bankruptcy_price = bankruptcy_price;
        p
    }

    #[test]
    fn breached_isolated_position_produces_closing_order() {
        let mut ids = IdGen::default();
        let candle = Candle::new(0, 51.0, 49.0, 52.0, 48.0, 1.0);
        let order = check(&candle, &long_position(50.0, 45.0), &mut ids, 0).unwrap();

        assert_eq!(order.side, OrderSide::Sell);
        assert_eq!(order.kind, OrderKind::Market);
        assert_eq!(order.flag, OrderFlag::ReduceOnly);
        assert_eq!(order.role, OrderRole::ClosePosition);
        assert_eq!(order.qty, -3.0);
        assert_eq!(order.price, 45.0);
    }

    #[test]
    fn cross_margin_and_untouched_prices_never_fire() {
        let mut ids = IdGen::default();
        let candle = Candle::new(0, 51.0, 49.0, 52.0, 48.0, 1.0);

        let mut cross = long_position(50.0, 45.0);
        cross.margin_mode = MarginMode::Cross;
        assert!(check(&candle, &cross, &mut ids, 0).is_none());

        assert!(check(&candle, &long_position(40.0, 35.0), &mut ids, 0).is_none());

        let flat = Position::new(&key(), 2.0, MarginMode::Isolated, 0.0);
        assert!(check(&candle, &flat, &mut ids, 0).is_none());
    }

    #[test]
    fn liquidation_closes_position_once() {
        let settings = ExchangeSettings {
            leverage: 2.0,
            ..ExchangeSettings::default()
        };
        let mut ctx = SimulationContext::new(settings, 0, 4);
        ctx.candles
            .add_candle(&key(), Timeframe::M1, Candle::new(0, 100.0, 100.0, 100.0, 100.0, 1.0))
            .unwrap();
        ctx.market_order(&key(), OrderSide::Buy, 1.0).unwrap();
        ctx.execute_pending_market_orders().unwrap();
        // 2x long at 100: bankruptcy and liquidation at 50
        assert_eq!(ctx.position(&key()).unwrap().liquidation_price, 50.0);

        let candle = Candle::new(60_000, 55.0, 49.0, 55.0, 48.0, 1.0);
        assert!(liquidate(&mut ctx, &key(), &candle).unwrap());
        assert_eq!(ctx.total_liquidations, 1);
        let pos = ctx.position(&key()).unwrap();
        assert_eq!(pos.side(), PositionSide::Flat);
        let trade = ctx.portfolio.trades.last().unwrap();
        assert!(trade.liquidated);
        assert_eq!(trade.exit_price, 50.0);

        assert!(!liquidate(&mut ctx, &key(), &candle).unwrap());
        assert_eq!(ctx.total_liquidations, 1);
    }
}
