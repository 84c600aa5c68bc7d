//! Portfolio — wallet balance, per-market positions and the completed trade list.

use super::ids::MarketKey;
use super::order::Order;
use super::position::{MarginMode, Position};
use super::trade::CompletedTrade;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Simulated exchange account settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeSettings {
    pub name: String,
    pub starting_balance: f64,
    /// Fee charged on fill notional, as a fraction (0.0004 = 4 bps).
    pub fee_rate: f64,
    pub leverage: f64,
    pub margin_mode: MarginMode,
    pub maintenance_margin_rate: f64,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            name: "Sandbox".to_string(),
            starting_balance: 10_000.0,
            fee_rate: 0.0,
            leverage: 1.0,
            margin_mode: MarginMode::Isolated,
            maintenance_margin_rate: 0.0,
        }
    }
}

/// Aggregate account state.
///
/// `balance` moves only by realized PnL and fees; [`Portfolio::total_balance`]
/// adds unrealized PnL marked at each position's `current_price`.
#[derive(Debug, Clone)]
pub struct Portfolio {
    pub settings: ExchangeSettings,
    pub balance: f64,
    pub positions: HashMap<MarketKey, Position>,
    pub trades: Vec<CompletedTrade>,
    pub total_fees: f64,
}

impl Portfolio {
    pub fn new(settings: ExchangeSettings) -> Self {
        Self {
            balance: settings.starting_balance,
            settings,
            positions: HashMap::new(),
            trades: Vec::new(),
            total_fees: 0.0,
        }
    }

    pub fn position(&self, key: &MarketKey) -> Option<&Position> {
        self.positions.get(key)
    }

    /// Get the position for a market, creating a flat one on first use.
    pub fn position_mut(&mut self, key: &MarketKey) -> &mut Position {
        let settings = &self.settings;
        self.positions.entry(key.clone()).or_insert_with(|| {
            Position::new(
                key,
                settings.leverage,
                settings.margin_mode,
                settings.maintenance_margin_rate,
            )
        })
    }

    /// Balance plus unrealized PnL of every open position.
    pub fn total_balance(&self) -> f64 {
        self.balance
            + self
                .positions
                .values()
                .map(Position::unrealized_pnl)
                .sum::<f64>()
    }

    /// Quantity a reduce-only order may actually fill, or `None` if it cannot
    /// reduce anything (flat position or same-direction order).
    pub fn reduce_only_qty(&self, order: &Order) -> Option<f64> {
        let pos = self.positions.get(&order.market_key())?;
        if !pos.is_open() || pos.qty.signum() == order.qty.signum() {
            return None;
        }
        Some(order.qty.signum() * order.qty.abs().min(pos.qty.abs()))
    }

    /// Apply an executed order's fill at `price`.
    ///
    /// Charges the fee, applies the fill to the position, realizes PnL and
    /// records a [`CompletedTrade`] for any quantity closed.
    pub fn apply_fill(
        &mut self,
        order: &Order,
        qty: f64,
        price: f64,
        now: i64,
        liquidated: bool,
    ) -> Option<CompletedTrade> {
        let fee = qty.abs() * price * self.settings.fee_rate;
        let key = order.market_key();
        let position = self.position_mut(&key);
        let opened_at = position.opened_at.unwrap_or(now);
        position.current_price = price;
        let outcome = position.apply_fill(qty, price, now);

        self.balance += outcome.realized_pnl - fee;
        self.total_fees += fee;

        if outcome.closed_qty <= 0.0 {
            return None;
        }
        let trade = CompletedTrade {
            exchange: key.exchange,
            symbol: key.symbol,
            side: outcome.prior_side,
            qty: outcome.closed_qty,
            entry_price: outcome.closed_entry_price,
            exit_price: price,
            opened_at,
            closed_at: now,
            pnl: outcome.realized_pnl,
            fee,
            liquidated,
        };
        self.trades.push(trade.clone());
        Some(trade)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::OrderId;
    use crate::domain::order::{OrderFlag, OrderKind, OrderRole, OrderSide, OrderStatus};
    use crate::domain::position::PositionSide;

    fn order(qty: f64, flag: OrderFlag) -> Order {
        Order {
            id: OrderId(1),
            exchange: "Sandbox".into(),
            symbol: "ETH-USDT".into(),
            side: if qty > 0.0 { OrderSide::Buy } else { OrderSide::Sell },
            kind: OrderKind::Market,
            flag,
            role: OrderRole::OpenPosition,
            price: 100.0,
            qty,
            status: OrderStatus::Executed,
            created_at: 0,
            executed_at: Some(0),
        }
    }

    #[test]
    fn round_trip_updates_balance_and_records_trade() {
        let mut portfolio = Portfolio::new(ExchangeSettings {
            fee_rate: 0.001,
            ..ExchangeSettings::default()
        });
        portfolio.apply_fill(&order(1.0, OrderFlag::None), 1.0, 100.0, 0, false);
        let trade = portfolio
            .apply_fill(&order(-1.0, OrderFlag::None), -1.0, 110.0, 120_000, false)
            .expect("closing fill records a trade");

        assert_eq!(trade.side, PositionSide::Long);
        assert!((trade.pnl - 10.0).abs() < 1e-12);
        assert_eq!(trade.holding_minutes(), 2);
        // 10 pnl - 0.1 - 0.11 fees
        assert!((portfolio.balance - (10_000.0 + 10.0 - 0.21)).abs() < 1e-9);
        assert_eq!(portfolio.trades.len(), 1);
    }

    #[test]
    fn total_balance_includes_unrealized() {
        let mut portfolio = Portfolio::new(ExchangeSettings::default());
        portfolio.apply_fill(&order(2.0, OrderFlag::None), 2.0, 100.0, 0, false);
        let key = MarketKey::new("Sandbox", "ETH-USDT");
        portfolio.position_mut(&key).current_price = 105.0;
        assert!((portfolio.total_balance() - 10_010.0).abs() < 1e-9);
    }

    #[test]
    fn reduce_only_is_clamped_to_position() {
        let mut portfolio = Portfolio::new(ExchangeSettings::default());
        assert_eq!(portfolio.reduce_only_qty(&order(-1.0, OrderFlag::ReduceOnly)), None);

        portfolio.apply_fill(&order(2.0, OrderFlag::None), 2.0, 100.0, 0, false);
        assert_eq!(
            portfolio.reduce_only_qty(&order(-5.0, OrderFlag::ReduceOnly)),
            Some(-2.0)
        );
        assert_eq!(portfolio.reduce_only_qty(&order(1.0, OrderFlag::ReduceOnly)), None);
    }
}
