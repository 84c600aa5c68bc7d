//! Strategy callback interface.
//!
//! The engine owns *when* a strategy runs; the strategy owns *what* it does.
//! `execute` is called once per closed candle of the route's timeframe and
//! only once `required_candles` candles of that timeframe are stored.
//! `terminate` is called exactly once when the run ends.

use super::context::SimulationContext;
use super::error::SimulationError;
use crate::domain::Route;
use thiserror::Error;

/// Failures raised by strategy code itself.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StrategyError {
    #[error("strategy '{name}' failed: {message}")]
    Failed { name: String, message: String },
}

pub trait Strategy: Send {
    fn name(&self) -> &str;

    /// Candles of the route timeframe that must be stored before `execute`.
    fn required_candles(&self) -> usize {
        0
    }

    fn execute(&mut self, route: &Route, ctx: &mut SimulationContext)
        -> Result<(), SimulationError>;

    fn terminate(
        &mut self,
        _route: &Route,
        _ctx: &mut SimulationContext,
    ) -> Result<(), SimulationError> {
        Ok(())
    }
}

/// Strategy that never trades.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStrategy;

impl Strategy for NullStrategy {
    fn name(&self) -> &str {
        "null"
    }

    fn execute(&mut self, _route: &Route, _ctx: &mut SimulationContext) -> Result<(), SimulationError> {
        Ok(())
    }
}
