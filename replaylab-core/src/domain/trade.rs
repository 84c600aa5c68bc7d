use super::position::PositionSide;
use serde::{Deserialize, Serialize};

/// A completed round trip: exposure opened and then fully (or partially) closed.
///
/// Every reducing fill produces one record for the quantity it closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedTrade {
    pub exchange: String,
    pub symbol: String,
    pub side: PositionSide,
    pub qty: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub opened_at: i64,
    pub closed_at: i64,
    pub pnl: f64,
    pub fee: f64,
    /// Closed by the liquidation monitor rather than a strategy order.
    pub liquidated: bool,
}

impl CompletedTrade {
    pub fn net_pnl(&self) -> f64 {
        self.pnl - self.fee
    }

    pub fn holding_minutes(&self) -> i64 {
        (self.closed_at - self.opened_at) / 60_000
    }
}
