//! Per-market position with isolated-margin risk prices.

use super::ids::MarketKey;
use super::order::OrderSide;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarginMode {
    #[default]
    Isolated,
    Cross,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
    Flat,
}

/// What happened to a position when a fill was applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillOutcome {
    /// PnL realized by the reducing part of the fill (0.0 when only increasing).
    pub realized_pnl: f64,
    /// Quantity (absolute) that closed existing exposure.
    pub closed_qty: f64,
    /// Entry price of the exposure that was closed.
    pub closed_entry_price: f64,
    /// Side of the position before the fill.
    pub prior_side: PositionSide,
}

/// One position per (exchange, symbol).
///
/// `qty` is signed (long > 0, short < 0). `liquidation_price` and
/// `bankruptcy_price` are NaN while flat, and NaN in cross mode since only
/// isolated positions are liquidated per market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub exchange: String,
    pub symbol: String,
    pub qty: f64,
    pub entry_price: f64,
    pub current_price: f64,
    pub leverage: f64,
    pub margin_mode: MarginMode,
    /// Maintenance margin as a fraction of notional.
    pub maintenance_margin_rate: f64,
    pub liquidation_price: f64,
    pub bankruptcy_price: f64,
    pub opened_at: Option<i64>,
}

impl Position {
    pub fn new(key: &MarketKey, leverage: f64, margin_mode: MarginMode, mmr: f64) -> Self {
        Self {
            exchange: key.exchange.clone(),
            symbol: key.symbol.clone(),
            qty: 0.0,
            entry_price: f64::NAN,
            current_price: f64::NAN,
            leverage,
            margin_mode,
            maintenance_margin_rate: mmr,
            liquidation_price: f64::NAN,
            bankruptcy_price: f64::NAN,
            opened_at: None,
        }
    }

    pub fn side(&self) -> PositionSide {
        if self.qty > 0.0 {
            PositionSide::Long
        } else if self.qty < 0.0 {
            PositionSide::Short
        } else {
            PositionSide::Flat
        }
    }

    pub fn is_open(&self) -> bool {
        self.qty != 0.0
    }

    /// Order side that would reduce this position, or `None` when flat.
    pub fn closing_side(&self) -> Option<OrderSide> {
        match self.side() {
            PositionSide::Long => Some(OrderSide::Sell),
            PositionSide::Short => Some(OrderSide::Buy),
            PositionSide::Flat => None,
        }
    }

    pub fn unrealized_pnl(&self) -> f64 {
        if !self.is_open() || self.current_price.is_nan() {
            return 0.0;
        }
        self.qty * (self.current_price - self.entry_price)
    }

    /// Apply a signed fill quantity at `price`.
    ///
    /// Same-direction fills average into the entry price; opposite fills
    /// realize PnL on the overlapping quantity and, when larger than the
    /// position, flip it with the remainder entered at `price`.
    pub fn apply_fill(&mut self, qty: f64, price: f64, now: i64) -> FillOutcome {
        let prior_side = self.side();
        let prior_entry = self.entry_price;
        let mut outcome = FillOutcome {
            realized_pnl: 0.0,
            closed_qty: 0.0,
            closed_entry_price: prior_entry,
            prior_side,
        };

        if !self.is_open() {
            self.qty = qty;
            self.entry_price = price;
            self.opened_at = Some(now);
        } else if self.qty.signum() == qty.signum() {
            let total = self.qty + qty;
            self.entry_price = (self.entry_price * self.qty + price * qty) / total;
            self.qty = total;
        } else {
            let closed = qty.abs().min(self.qty.abs());
            outcome.closed_qty = closed;
            outcome.realized_pnl = closed * (price - self.entry_price) * self.qty.signum();
            let remaining = self.qty + qty;
            if remaining.abs() < f64::EPSILON {
                self.qty = 0.0;
                self.entry_price = f64::NAN;
                self.opened_at = None;
            } else if remaining.signum() != self.qty.signum() {
                self.qty = remaining;
                self.entry_price = price;
                self.opened_at = Some(now);
            } else {
                self.qty = remaining;
            }
        }

        self.refresh_risk_prices();
        outcome
    }

    /// Recompute bankruptcy and liquidation prices from entry and leverage.
    pub fn refresh_risk_prices(&mut self) {
        if !self.is_open() || self.margin_mode == MarginMode::Cross || self.leverage <= 0.0 {
            self.bankruptcy_price = f64::NAN;
            self.liquidation_price = f64::NAN;
            return;
        }
        let margin = 1.0 / self.leverage;
        match self.side() {
            PositionSide::Long => {
                self.bankruptcy_price = self.entry_price * (1.0 - margin);
                self.liquidation_price =
                    self.entry_price * (1.0 - margin + self.maintenance_margin_rate);
            }
            PositionSide::Short => {
                self.bankruptcy_price = self.entry_price * (1.0 + margin);
                self.liquidation_price =
                    self.entry_price * (1.0 + margin - self.maintenance_margin_rate);
            }
            PositionSide::Flat => {}
        }
    }
}
