use super::{Simulation, SimulationDriver, SimulationMode};
use crate::domain::Candle;
use crate::engine::error::SimulationError;

/// Consumes exactly one minute per step.
///
/// Before the loop each market's series is repaired so that every candle
/// opens at the previous close. Slower than [`super::AdaptiveDriver`] and
/// used to validate it.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedStepDriver;

impl SimulationDriver for FixedStepDriver {
    fn mode(&self) -> SimulationMode {
        SimulationMode::FixedStep
    }

    fn run_loop(&mut self, sim: &mut Simulation) -> Result<(), SimulationError> {
        for market in &mut sim.markets {
            repair_jumped_candles(&mut market.candles);
        }
        for consumed in 0..sim.len() {
            sim.step(consumed, consumed + 1)?;
        }
        Ok(())
    }
}

/// Clamp each candle's open to the previous (already repaired) close.
///
/// Opening above the previous close lowers the open and widens the low wick;
/// opening below raises it and widens the high wick.
pub fn repair_jumped_candles(candles: &mut [Candle]) {
    for i in 1..candles.len() {
        let prev_close = candles[i - 1].close;
        let candle = &mut candles[i];
        if prev_close < candle.open {
            candle.open = prev_close;
            candle.low = candle.low.min(prev_close);
        } else if prev_close > candle.open {
            candle.open = prev_close;
            candle.high = candle.high.max(prev_close);
        }
    }
}
