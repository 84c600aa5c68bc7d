//! Order book — per-market order registry and lifecycle state machine.
//!
//! Every order placed on a (exchange, symbol) is kept in insertion order.
//! That order is the fill priority the price-path matcher uses when several
//! orders sit inside the same price excursion.
//!
//! Active orders are tracked in a separate index list, so triggering, counting
//! and flushing cost O(active) no matter how many orders were executed or
//! canceled before. Lookups by id go through a hash index.
//!
//! Transitions: Active → Executed | Canceled. Both are terminal, so executing
//! an order twice is an error rather than a second fill.
//!
//! The order book does NOT compute fill prices or touch positions. The
//! simulation context does that when it executes an order.

use crate::domain::{MarketKey, Order, OrderId, OrderKind, OrderStatus};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrderBookError {
    #[error("order {0} not found on {1}")]
    OrderNotFound(OrderId, MarketKey),

    #[error("order {0} is not active (status: {1:?})")]
    OrderNotActive(OrderId, OrderStatus),
}

/// Orders of one market.
#[derive(Debug, Default)]
struct MarketOrders {
    /// Every order ever placed, in insertion order.
    history: Vec<Order>,
    /// Positions in `history` of the active orders, ascending.
    active: Vec<usize>,
    by_id: HashMap<OrderId, usize>,
}

impl MarketOrders {
    fn iter_active(&self) -> impl Iterator<Item = &Order> + '_ {
        self.active.iter().filter_map(|&i| self.history.get(i))
    }

    /// Move an active order to a terminal status and drop it from the active list.
    fn close(
        &mut self,
        key: &MarketKey,
        id: OrderId,
        status: OrderStatus,
        executed_at: Option<i64>,
    ) -> Result<&Order, OrderBookError> {
        let not_found = || OrderBookError::OrderNotFound(id, key.clone());
        let index = *self.by_id.get(&id).ok_or_else(not_found)?;
        let order = self.history.get_mut(index).ok_or_else(not_found)?;
        let slot = match self.active.binary_search(&index) {
            Ok(slot) => slot,
            Err(_) => return Err(OrderBookError::OrderNotActive(id, order.status)),
        };
        self.active.remove(slot);
        order.status = status;
        order.executed_at = executed_at;
        Ok(&*order)
    }
}

#[derive(Debug, Default)]
pub struct OrderBook {
    books: HashMap<MarketKey, MarketOrders>,
    /// Markets in first-seen order, for deterministic iteration.
    markets: Vec<MarketKey>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a market so it iterates in a fixed position even before its
    /// first order.
    pub fn register_market(&mut self, key: &MarketKey) {
        if !self.books.contains_key(key) {
            self.books.insert(key.clone(), MarketOrders::default());
            self.markets.push(key.clone());
        }
    }

    pub fn markets(&self) -> &[MarketKey] {
        &self.markets
    }

    /// Add an order at the back of its market's priority list.
    pub fn add(&mut self, order: Order) {
        let key = order.market_key();
        self.register_market(&key);
        if let Some(book) = self.books.get_mut(&key) {
            let index = book.history.len();
            book.by_id.insert(order.id, index);
            if order.is_active() {
                book.active.push(index);
            }
            book.history.push(order);
        }
    }

    /// All orders ever placed on a market, in insertion order.
    pub fn orders(&self, key: &MarketKey) -> &[Order] {
        self.books
            .get(key)
            .map(|b| b.history.as_slice())
            .unwrap_or(&[])
    }

    /// Active orders of a market, in insertion order.
    pub fn active_orders<'a>(&'a self, key: &MarketKey) -> impl Iterator<Item = &'a Order> + 'a {
        self.books.get(key).into_iter().flat_map(|b| b.iter_active())
    }

    pub fn count_active(&self, key: &MarketKey) -> usize {
        self.books.get(key).map_or(0, |b| b.active.len())
    }

    pub fn get(&self, key: &MarketKey, id: OrderId) -> Option<&Order> {
        let book = self.books.get(key)?;
        book.by_id.get(&id).and_then(|&i| book.history.get(i))
    }

    /// First active non-market order whose price lies in `[low, high]`.
    pub fn first_triggered(&self, key: &MarketKey, low: f64, high: f64) -> Option<&Order> {
        self.active_orders(key)
            .find(|o| o.kind != OrderKind::Market && o.price >= low && o.price <= high)
    }

    /// IDs of every active market order, market by market.
    pub fn pending_market_orders(&self) -> Vec<(MarketKey, OrderId)> {
        self.markets
            .iter()
            .flat_map(|key| {
                self.active_orders(key)
                    .filter(|o| o.kind == OrderKind::Market)
                    .map(move |o| (key.clone(), o.id))
            })
            .collect()
    }

    /// Transition Active → Executed. Returns a copy of the executed order.
    pub fn mark_executed(
        &mut self,
        key: &MarketKey,
        id: OrderId,
        now: i64,
    ) -> Result<Order, OrderBookError> {
        self.book_mut(key, id)?
            .close(key, id, OrderStatus::Executed, Some(now))
            .cloned()
    }

    /// Transition Active → Canceled.
    pub fn cancel(&mut self, key: &MarketKey, id: OrderId) -> Result<(), OrderBookError> {
        self.book_mut(key, id)?
            .close(key, id, OrderStatus::Canceled, None)
            .map(|_| ())
    }

    /// Cancel every active order on a market. Returns how many were canceled.
    pub fn cancel_all(&mut self, key: &MarketKey) -> usize {
        let Some(book) = self.books.get_mut(key) else {
            return 0;
        };
        let active = std::mem::take(&mut book.active);
        for &i in &active {
            if let Some(order) = book.history.get_mut(i) {
                order.status = OrderStatus::Canceled;
            }
        }
        active.len()
    }

    fn book_mut(&mut self, key: &MarketKey, id: OrderId) -> Result<&mut MarketOrders, OrderBookError> {
        self.books
            .get_mut(key)
            .ok_or_else(|| OrderBookError::OrderNotFound(id, key.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderFlag, OrderRole, OrderSide};

    fn key() -> MarketKey {
        MarketKey::new("Sandbox", "BTC-USDT")
    }

    fn order(id: u64, kind: OrderKind, price: f64) -> Order {
        Order {
            id: OrderId(id),
            exchange: "Sandbox".into(),
            symbol: "BTC-USDT".into(),
            side: OrderSide::Buy,
            kind,
            flag: OrderFlag::None,
            role: OrderRole::OpenPosition,
            price,
            qty: 1.0,
            status: OrderStatus::Active,
            created_at: 0,
            executed_at: None,
        }
    }

    #[test]
    fn insertion_order_is_priority_order() {
        let mut book = OrderBook::new();
        book.add(order(2, OrderKind::Limit, 100.0));
        book.add(order(1, OrderKind::Stop, 101.0));
        let hit = book.first_triggered(&key(), 99.0, 102.0).unwrap();
        assert_eq!(hit.id, OrderId(2));
    }

    #[test]
    fn market_orders_never_trigger_on_price() {
        let mut book = OrderBook::new();
        book.add(order(1, OrderKind::Market, 100.0));
        assert!(book.first_triggered(&key(), 0.0, 1_000.0).is_none());
        assert_eq!(book.pending_market_orders(), vec![(key(), OrderId(1))]);
    }

    #[test]
    fn executing_twice_is_rejected() {
        let mut book = OrderBook::new();
        book.add(order(1, OrderKind::Limit, 100.0));
        let executed = book.mark_executed(&key(), OrderId(1), 60_000).unwrap();
        assert_eq!(executed.executed_at, Some(60_000));
        assert_eq!(
            book.mark_executed(&key(), OrderId(1), 120_000),
            Err(OrderBookError::OrderNotActive(OrderId(1), OrderStatus::Executed))
        );
        assert_eq!(book.count_active(&key()), 0);
    }

    #[test]
    fn cancel_removes_from_active_set() {
        let mut book = OrderBook::new();
        book.add(order(1, OrderKind::Limit, 100.0));
        book.add(order(2, OrderKind::Limit, 90.0));
        book.cancel(&key(), OrderId(1)).unwrap();
        assert_eq!(book.count_active(&key()), 1);
        assert!(book.cancel(&key(), OrderId(1)).is_err());
        assert_eq!(book.cancel_all(&key()), 1);
        assert_eq!(book.count_active(&key()), 0);
    }

    #[test]
    fn requoting_keeps_history_but_scans_only_active() {
        let mut book = OrderBook::new();
        let mut id = 0;
        for round in 0..1_000 {
            assert_eq!(book.cancel_all(&key()), if round == 0 { 0 } else { 3 });
            for offset in 0..3 {
                id += 1;
                book.add(order(id, OrderKind::Limit, 100.0 - offset as f64));
            }
        }

        assert_eq!(book.orders(&key()).len(), 3_000);
        assert_eq!(book.count_active(&key()), 3);
        let active: Vec<OrderId> = book.active_orders(&key()).map(|o| o.id).collect();
        assert_eq!(active, vec![OrderId(2_998), OrderId(2_999), OrderId(3_000)]);

        let old = book.get(&key(), OrderId(1)).unwrap();
        assert_eq!(old.status, OrderStatus::Canceled);
        assert_eq!(
            book.mark_executed(&key(), OrderId(1), 0),
            Err(OrderBookError::OrderNotActive(OrderId(1), OrderStatus::Canceled))
        );
    }

    #[test]
    fn priority_survives_removal_from_the_middle() {
        let mut book = OrderBook::new();
        for id in 1..=4 {
            book.add(order(id, OrderKind::Limit, 100.0));
        }
        book.cancel(&key(), OrderId(2)).unwrap();
        book.mark_executed(&key(), OrderId(1), 60_000).unwrap();

        assert_eq!(book.first_triggered(&key(), 99.0, 101.0).map(|o| o.id), Some(OrderId(3)));
        book.add(order(5, OrderKind::Limit, 100.0));
        let active: Vec<OrderId> = book.active_orders(&key()).map(|o| o.id).collect();
        assert_eq!(active, vec![OrderId(3), OrderId(4), OrderId(5)]);
    }

    #[test]
    fn unknown_order_is_not_found() {
        let mut book = OrderBook::new();
        assert!(matches!(
            book.cancel(&key(), OrderId(9)),
            Err(OrderBookError::OrderNotFound(OrderId(9), _))
        ));
    }
}
