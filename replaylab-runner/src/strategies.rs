//! Strategy factory — converts a [`Route`] into a live [`Strategy`].
//!
//! Built-in strategies:
//! - `null` — never trades
//! - `buy_and_hold` — market buy on the first execution, closed at termination
//! - `grid` — ladder of limit orders around the price, re-centered each candle
//! - `breakout` — long on a close above the prior `lookback` highs, flat on a
//!   close below the prior lows

use replaylab_core::domain::{MarketKey, OrderFlag, OrderKind, OrderSide, Route};
use replaylab_core::engine::{NullStrategy, SimulationContext, SimulationError, Strategy};
use thiserror::Error;

/// Names accepted by [`create_strategy`].
pub const STRATEGY_NAMES: &[&str] = &["null", "buy_and_hold", "grid", "breakout"];

// ─── Error type ──────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown strategy '{name}' (available: {})", STRATEGY_NAMES.join(", "))]
    InvalidStrategy { name: String },

    #[error("strategy '{strategy}': hyperparameter {param} = {value} is out of range")]
    InvalidParam {
        strategy: String,
        param: &'static str,
        value: f64,
    },
}

// ─── Helpers ─────────────────────────────────────────────────────────

fn param(route: &Route, name: &str, default: f64) -> f64 {
    route.params.get(name).copied().unwrap_or(default)
}

fn positive(route: &Route, name: &'static str, default: f64) -> Result<f64, RegistryError> {
    let value = param(route, name, default);
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(RegistryError::InvalidParam {
            strategy: route.strategy.clone(),
            param: name,
            value,
        })
    }
}

fn positive_usize(route: &Route, name: &'static str, default: usize) -> Result<usize, RegistryError> {
    let value = param(route, name, default as f64);
    if value.is_finite() && value >= 1.0 {
        Ok(value as usize)
    } else {
        Err(RegistryError::InvalidParam {
            strategy: route.strategy.clone(),
            param: name,
            value,
        })
    }
}

/// Submit a reduce-only market order that flattens the position on `key`.
fn close_position(ctx: &mut SimulationContext, key: &MarketKey) -> Result<(), SimulationError> {
    let Some((side, qty)) = ctx
        .position(key)
        .and_then(|p| p.closing_side().map(|side| (side, p.qty.abs())))
    else {
        return Ok(());
    };
    ctx.submit(key, side, OrderKind::Market, qty, None, OrderFlag::ReduceOnly)?;
    Ok(())
}

// ─── Factory ─────────────────────────────────────────────────────────

/// Create the strategy a route names, configured from its hyperparameters.
pub fn create_strategy(route: &Route) -> Result<Box<dyn Strategy>, RegistryError> {
    match route.strategy.as_str() {
        "null" => Ok(Box::new(NullStrategy)),
        "buy_and_hold" => Ok(Box::new(BuyAndHold {
            qty: positive(route, "qty", 1.0)?,
            entered: false,
        })),
        "grid" => Ok(Box::new(Grid {
            levels: positive_usize(route, "levels", 3)?,
            spacing: positive(route, "spacing", 0.005)?,
            qty: positive(route, "qty", 1.0)?,
        })),
        "breakout" => Ok(Box::new(Breakout {
            lookback: positive_usize(route, "lookback", 20)?,
            qty: positive(route, "qty", 1.0)?,
        })),
        other => Err(RegistryError::InvalidStrategy {
            name: other.to_string(),
        }),
    }
}

// ─── Built-ins ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BuyAndHold {
    qty: f64,
    entered: bool,
}

impl Strategy for BuyAndHold {
    fn name(&self) -> &str {
        "buy_and_hold"
    }

    fn required_candles(&self) -> usize {
        1
    }

    fn execute(&mut self, route: &Route, ctx: &mut SimulationContext) -> Result<(), SimulationError> {
        if !self.entered {
            ctx.market_order(&route.market_key(), OrderSide::Buy, self.qty)?;
            self.entered = true;
        }
        Ok(())
    }

    fn terminate(&mut self, route: &Route, ctx: &mut SimulationContext) -> Result<(), SimulationError> {
        close_position(ctx, &route.market_key())
    }
}

/// Symmetric limit ladder: `levels` buys below and `levels` sells above the
/// current price, `spacing` apart (as a fraction of price).
#[derive(Debug, Clone)]
pub struct Grid {
    levels: usize,
    spacing: f64,
    qty: f64,
}

impl Strategy for Grid {
    fn name(&self) -> &str {
        "grid"
    }

    fn required_candles(&self) -> usize {
        1
    }

    fn execute(&mut self, route: &Route, ctx: &mut SimulationContext) -> Result<(), SimulationError> {
        let key = route.market_key();
        let price = ctx
            .current_price(&key)
            .ok_or_else(|| SimulationError::NoMarketPrice(key.clone()))?;

        ctx.cancel_all_orders(&key);
        for level in 1..=self.levels {
            let offset = self.spacing * level as f64;
            ctx.limit_order(&key, OrderSide::Buy, self.qty, price * (1.0 - offset))?;
            ctx.limit_order(&key, OrderSide::Sell, self.qty, price * (1.0 + offset))?;
        }
        Ok(())
    }

    fn terminate(&mut self, route: &Route, ctx: &mut SimulationContext) -> Result<(), SimulationError> {
        let key = route.market_key();
        ctx.cancel_all_orders(&key);
        close_position(ctx, &key)
    }
}

/// Donchian-style channel breakout on the route timeframe, long only.
#[derive(Debug, Clone)]
pub struct Breakout {
    lookback: usize,
    qty: f64,
}

impl Strategy for Breakout {
    fn name(&self) -> &str {
        "breakout"
    }

    fn required_candles(&self) -> usize {
        self.lookback + 1
    }

    fn execute(&mut self, route: &Route, ctx: &mut SimulationContext) -> Result<(), SimulationError> {
        let key = route.market_key();
        let candles = ctx.candles.candles(&key, route.timeframe);
        let Some((last, history)) = candles.split_last() else {
            return Ok(());
        };
        let window = &history[history.len().saturating_sub(self.lookback)..];
        let upper = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
        let lower = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
        let close = last.close;

        let long = ctx.position(&key).is_some_and(|p| p.qty > 0.0);
        if !long && close > upper {
            ctx.market_order(&key, OrderSide::Buy, self.qty)?;
        } else if long && close < lower {
            close_position(ctx, &key)?;
        }
        Ok(())
    }

    fn terminate(&mut self, route: &Route, ctx: &mut SimulationContext) -> Result<(), SimulationError> {
        close_position(ctx, &route.market_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replaylab_core::domain::{Candle, ExchangeSettings, Timeframe};
    use std::collections::BTreeMap;

    fn route(strategy: &str, params: &[(&str, f64)]) -> Route {
        Route {
            exchange: "Sandbox".into(),
            symbol: "BTC-USDT".into(),
            timeframe: Timeframe::M1,
            strategy: strategy.into(),
            params: params.iter().map(|(k, v)| (k.to_string(), *v)).collect::<BTreeMap<_, _>>(),
        }
    }

    fn ctx_with_price(price: f64) -> SimulationContext {
        let mut ctx = SimulationContext::new(ExchangeSettings::default(), 0, 4);
        let key = MarketKey::new("Sandbox", "BTC-USDT");
        ctx.candles
            .add_candle(&key, Timeframe::M1, Candle::new(0, price, price, price, price, 1.0))
            .unwrap();
        ctx
    }

    #[test]
    fn every_builtin_name_is_constructible() {
        for name in STRATEGY_NAMES {
            let strategy = create_strategy(&route(name, &[])).unwrap();
            assert_eq!(strategy.name(), *name);
        }
    }

    #[test]
    fn unknown_name_lists_available() {
        let err = create_strategy(&route("martingale", &[])).err().expect("unknown name");
        assert!(matches!(err, RegistryError::InvalidStrategy { .. }));
        let msg = err.to_string();
        assert!(msg.contains("martingale"));
        assert!(msg.contains("grid"));
    }

    #[test]
    fn params_are_validated() {
        let err = create_strategy(&route("grid", &[("spacing", -0.01)]))
            .err()
            .expect("negative spacing");
        assert!(matches!(err, RegistryError::InvalidParam { param: "spacing", .. }));

        let err = create_strategy(&route("breakout", &[("lookback", 0.5)]))
            .err()
            .expect("fractional lookback");
        assert!(matches!(err, RegistryError::InvalidParam { param: "lookback", .. }));
    }

    #[test]
    fn breakout_requires_lookback_plus_one() {
        let strategy = create_strategy(&route("breakout", &[("lookback", 5.0)])).unwrap();
        assert_eq!(strategy.required_candles(), 6);
    }

    #[test]
    fn grid_places_symmetric_ladder() {
        let r = route("grid", &[("levels", 2.0), ("spacing", 0.01), ("qty", 0.5)]);
        let mut grid = create_strategy(&r).unwrap();
        let mut ctx = ctx_with_price(100.0);
        let key = r.market_key();

        grid.execute(&r, &mut ctx).unwrap();
        let mut prices: Vec<f64> = ctx.orders.active_orders(&key).map(|o| o.price).collect();
        prices.sort_by(f64::total_cmp);
        let expected = [98.0, 99.0, 101.0, 102.0];
        assert_eq!(prices.len(), 4);
        for (got, want) in prices.iter().zip(expected) {
            assert!((got - want).abs() < 1e-9);
        }

        // re-centering replaces the ladder instead of stacking it
        grid.execute(&r, &mut ctx).unwrap();
        assert_eq!(ctx.orders.count_active(&key), 4);
    }

    #[test]
    fn buy_and_hold_enters_once() {
        let r = route("buy_and_hold", &[("qty", 2.0)]);
        let mut strategy = create_strategy(&r).unwrap();
        let mut ctx = ctx_with_price(100.0);

        strategy.execute(&r, &mut ctx).unwrap();
        strategy.execute(&r, &mut ctx).unwrap();
        assert_eq!(ctx.orders.count_active(&r.market_key()), 1);
        assert_eq!(ctx.execute_pending_market_orders().unwrap(), 1);
        assert_eq!(ctx.position(&r.market_key()).unwrap().qty, 2.0);
    }

    #[test]
    fn close_position_is_noop_when_flat() {
        let mut ctx = ctx_with_price(100.0);
        let key = MarketKey::new("Sandbox", "BTC-USDT");
        close_position(&mut ctx, &key).unwrap();
        assert_eq!(ctx.orders.count_active(&key), 0);
    }
}
