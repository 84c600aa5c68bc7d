//! Order types and lifecycle states.

use super::ids::{MarketKey, OrderId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    /// Sign quantities carry for this side: positive for buys, negative for sells.
    pub fn sign(self) -> f64 {
        match self {
            OrderSide::Buy => 1.0,
            OrderSide::Sell => -1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    /// Fills at the current price on the next pending-market flush.
    Market,
    /// Fills when price trades through `price`.
    Limit,
    /// Fills when price trades through `price`.
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderFlag {
    #[default]
    None,
    /// May only shrink an existing position.
    ReduceOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderRole {
    OpenPosition,
    IncreasePosition,
    ReducePosition,
    ClosePosition,
}

/// Order lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Active,
    Executed,
    Canceled,
}

/// A single order in a per-market order book.
///
/// `qty` is signed: positive for buys, negative for sells (see [`prepare_qty`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub exchange: String,
    pub symbol: String,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub flag: OrderFlag,
    pub role: OrderRole,
    pub price: f64,
    pub qty: f64,
    pub status: OrderStatus,
    pub created_at: i64,
    pub executed_at: Option<i64>,
}

impl Order {
    pub fn is_active(&self) -> bool {
        self.status == OrderStatus::Active
    }

    pub fn is_executed(&self) -> bool {
        self.status == OrderStatus::Executed
    }

    pub fn is_reduce_only(&self) -> bool {
        self.flag == OrderFlag::ReduceOnly
    }

    pub fn market_key(&self) -> MarketKey {
        MarketKey::new(self.exchange.clone(), self.symbol.clone())
    }
}

/// Sign-adjust an absolute quantity for the given side.
pub fn prepare_qty(qty: f64, side: OrderSide) -> f64 {
    qty.abs() * side.sign()
}
