//! Simulation context — all mutable state of one simulation in one place.
//!
//! The clock, candle store, order book, portfolio and run counters belong to
//! exactly one simulation. Nothing here is global, so independent
//! simulations can run side by side on different threads.

use super::candle_store::CandleStore;
use super::clock::SimulationClock;
use super::error::SimulationError;
use super::order_book::OrderBook;
use crate::domain::{
    prepare_qty, CompletedTrade, ExchangeSettings, IdGen, MarketKey, Order, OrderFlag, OrderId,
    OrderKind, OrderRole, OrderSide, OrderStatus, Portfolio, Position, Timeframe,
};

pub struct SimulationContext {
    pub clock: SimulationClock,
    pub candles: CandleStore,
    pub orders: OrderBook,
    pub portfolio: Portfolio,
    pub ids: IdGen,
    /// Liquidation orders fired during the run (reporting only).
    pub total_liquidations: usize,
    pub daily_balances: Vec<f64>,
}

impl SimulationContext {
    pub fn new(settings: ExchangeSettings, starting_time: i64, capacity: usize) -> Self {
        Self {
            clock: SimulationClock::new(starting_time),
            candles: CandleStore::with_capacity(capacity),
            orders: OrderBook::new(),
            portfolio: Portfolio::new(settings),
            ids: IdGen::default(),
            total_liquidations: 0,
            daily_balances: Vec::new(),
        }
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    pub fn position(&self, key: &MarketKey) -> Option<&Position> {
        self.portfolio.position(key)
    }

    /// Latest known price: the position's mark, else the newest 1m close.
    pub fn current_price(&self, key: &MarketKey) -> Option<f64> {
        self.portfolio
            .position(key)
            .map(|p| p.current_price)
            .filter(|p| !p.is_nan())
            .or_else(|| self.candles.current(key, Timeframe::M1).map(|c| c.close))
    }

    pub fn market_order(
        &mut self,
        key: &MarketKey,
        side: OrderSide,
        qty: f64,
    ) -> Result<OrderId, SimulationError> {
        self.submit(key, side, OrderKind::Market, qty, None, OrderFlag::None)
    }

    pub fn limit_order(
        &mut self,
        key: &MarketKey,
        side: OrderSide,
        qty: f64,
        price: f64,
    ) -> Result<OrderId, SimulationError> {
        self.submit(key, side, OrderKind::Limit, qty, Some(price), OrderFlag::None)
    }

    pub fn stop_order(
        &mut self,
        key: &MarketKey,
        side: OrderSide,
        qty: f64,
        price: f64,
    ) -> Result<OrderId, SimulationError> {
        self.submit(key, side, OrderKind::Stop, qty, Some(price), OrderFlag::None)
    }

    /// Place an order. `qty` is absolute; the sign comes from `side`.
    ///
    /// Market orders are priced at the current price and wait in the book
    /// until the next [`execute_pending_market_orders`](Self::execute_pending_market_orders).
    pub fn submit(
        &mut self,
        key: &MarketKey,
        side: OrderSide,
        kind: OrderKind,
        qty: f64,
        price: Option<f64>,
        flag: OrderFlag,
    ) -> Result<OrderId, SimulationError> {
        if !(qty.is_finite() && qty > 0.0) {
            return Err(SimulationError::InvalidOrder {
                key: key.clone(),
                reason: format!("quantity must be positive, got {qty}"),
            });
        }
        let price = match (kind, price) {
            (OrderKind::Market, _) => self
                .current_price(key)
                .ok_or_else(|| SimulationError::NoMarketPrice(key.clone()))?,
            (_, Some(p)) if p.is_finite() && p > 0.0 => p,
            (_, p) => {
                return Err(SimulationError::InvalidOrder {
                    key: key.clone(),
                    reason: format!("{kind:?} order needs a positive price, got {p:?}"),
                })
            }
        };

        let qty = prepare_qty(qty, side);
        let id = self.ids.next_order_id();
        let order = Order {
            id,
            exchange: key.exchange.clone(),
            symbol: key.symbol.clone(),
            side,
            kind,
            flag,
            role: self.role_for(key, qty),
            price,
            qty,
            status: OrderStatus::Active,
            created_at: self.now(),
            executed_at: None,
        };
        self.orders.add(order);
        Ok(id)
    }

    pub fn cancel_order(&mut self, key: &MarketKey, id: OrderId) -> Result<(), SimulationError> {
        Ok(self.orders.cancel(key, id)?)
    }

    pub fn cancel_all_orders(&mut self, key: &MarketKey) -> usize {
        self.orders.cancel_all(key)
    }

    /// Execute an active order at `price` and apply it to the portfolio.
    ///
    /// A reduce-only order with nothing to reduce is canceled instead.
    pub fn execute_order(
        &mut self,
        key: &MarketKey,
        id: OrderId,
        price: f64,
    ) -> Result<Option<CompletedTrade>, SimulationError> {
        self.execute_order_inner(key, id, price, false)
    }

    pub(crate) fn execute_order_inner(
        &mut self,
        key: &MarketKey,
        id: OrderId,
        price: f64,
        liquidation: bool,
    ) -> Result<Option<CompletedTrade>, SimulationError> {
        let order = self
            .orders
            .get(key, id)
            .cloned()
            .ok_or_else(|| super::order_book::OrderBookError::OrderNotFound(id, key.clone()))?;

        let qty = if order.is_reduce_only() {
            match self.portfolio.reduce_only_qty(&order) {
                Some(qty) => qty,
                None => {
                    tracing::warn!(
                        "{key}: reduce-only order {id} has no position to reduce, canceling"
                    );
                    self.orders.cancel(key, id)?;
                    return Ok(None);
                }
            }
        } else {
            order.qty
        };

        let now = self.now();
        let executed = self.orders.mark_executed(key, id, now)?;
        Ok(self
            .portfolio
            .apply_fill(&executed, qty, price, now, liquidation))
    }

    /// Fill every active market order at its market's current price.
    ///
    /// Returns how many orders were processed.
    pub fn execute_pending_market_orders(&mut self) -> Result<usize, SimulationError> {
        let pending = self.orders.pending_market_orders();
        for (key, id) in &pending {
            let fallback = self.orders.get(key, *id).map(|o| o.price);
            let price = self
                .current_price(key)
                .or(fallback)
                .ok_or_else(|| SimulationError::NoMarketPrice(key.clone()))?;
            self.execute_order(key, *id, price)?;
        }
        Ok(pending.len())
    }

    /// Record the portfolio's total balance as one point of the daily series.
    pub fn snapshot_balance(&mut self) {
        let balance = self.portfolio.total_balance();
        self.daily_balances.push(balance);
    }

    fn role_for(&self, key: &MarketKey, qty: f64) -> OrderRole {
        match self.portfolio.position(key).filter(|p| p.is_open()) {
            None => OrderRole::OpenPosition,
            Some(p) if p.qty.signum() == qty.signum() => OrderRole::IncreasePosition,
            Some(p) if qty.abs() >= p.qty.abs() => OrderRole::ClosePosition,
            Some(_) => OrderRole::ReducePosition,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Candle, PositionSide};

    fn key() -> MarketKey {
        MarketKey::new("Sandbox", "BTC-USDT")
    }

    fn ctx_with_price(price: f64) -> SimulationContext {
        let mut ctx = SimulationContext::new(ExchangeSettings::default(), 0, 16);
        ctx.candles
            .add_candle(&key(), Timeframe::M1, Candle::new(0, price, price, price, price, 1.0))
            .unwrap();
        ctx
    }

    #[test]
    fn market_order_needs_a_price() {
        let mut ctx = SimulationContext::new(ExchangeSettings::default(), 0, 0);
        assert!(matches!(
            ctx.market_order(&key(), OrderSide::Buy, 1.0),
            Err(SimulationError::NoMarketPrice(_))
        ));
    }

    #[test]
    fn non_positive_quantity_is_rejected() {
        let mut ctx = ctx_with_price(100.0);
        assert!(matches!(
            ctx.limit_order(&key(), OrderSide::Buy, 0.0, 90.0),
            Err(SimulationError::InvalidOrder { .. })
        ));
    }

    #[test]
    fn pending_market_orders_fill_at_current_price() {
        let mut ctx = ctx_with_price(100.0);
        let id = ctx.market_order(&key(), OrderSide::Buy, 2.0).unwrap();
        assert_eq!(ctx.execute_pending_market_orders().unwrap(), 1);

        let order = ctx.orders.get(&key(), id).unwrap();
        assert_eq!(order.status, OrderStatus::Executed);
        let pos = ctx.position(&key()).unwrap();
        assert_eq!(pos.qty, 2.0);
        assert_eq!(pos.entry_price, 100.0);
        assert_eq!(ctx.execute_pending_market_orders().unwrap(), 0);
    }

    #[test]
    fn roles_follow_position_state() {
        let mut ctx = ctx_with_price(100.0);
        let open = ctx.market_order(&key(), OrderSide::Buy, 2.0).unwrap();
        ctx.execute_pending_market_orders().unwrap();
        let increase = ctx.limit_order(&key(), OrderSide::Buy, 1.0, 90.0).unwrap();
        let reduce = ctx.limit_order(&key(), OrderSide::Sell, 1.0, 110.0).unwrap();
        let close = ctx.stop_order(&key(), OrderSide::Sell, 2.0, 80.0).unwrap();

        let role = |id| ctx.orders.get(&key(), id).unwrap().role;
        assert_eq!(role(open), OrderRole::OpenPosition);
        assert_eq!(role(increase), OrderRole::IncreasePosition);
        assert_eq!(role(reduce), OrderRole::ReducePosition);
        assert_eq!(role(close), OrderRole::ClosePosition);
    }

    #[test]
    fn reduce_only_without_position_is_canceled() {
        let mut ctx = ctx_with_price(100.0);
        let id = ctx
            .submit(
                &key(),
                OrderSide::Sell,
                OrderKind::Market,
                1.0,
                None,
                OrderFlag::ReduceOnly,
            )
            .unwrap();
        ctx.execute_pending_market_orders().unwrap();
        assert_eq!(ctx.orders.get(&key(), id).unwrap().status, OrderStatus::Canceled);
        assert!(ctx.position(&key()).map_or(true, |p| p.side() == PositionSide::Flat));
    }

    #[test]
    fn snapshot_records_total_balance() {
        let mut ctx = ctx_with_price(100.0);
        ctx.snapshot_balance();
        assert_eq!(ctx.daily_balances, vec![10_000.0]);
    }
}
