use super::{Simulation, SimulationDriver, SimulationMode};
use crate::engine::error::SimulationError;
use crate::engine::scheduler;

/// Consumes as many minutes per step as the skip-ahead scheduler allows.
///
/// A window never crosses a subscribed timeframe boundary, a day boundary or
/// the end of data, so aggregation, strategy cadence and daily snapshots see
/// exactly the same boundaries as a minute-by-minute run.
#[derive(Debug, Default, Clone, Copy)]
pub struct AdaptiveDriver;

impl SimulationDriver for AdaptiveDriver {
    fn mode(&self) -> SimulationMode {
        SimulationMode::Adaptive
    }

    fn run_loop(&mut self, sim: &mut Simulation) -> Result<(), SimulationError> {
        let length = sim.len();
        let mut consumed = 0;
        while consumed < length {
            let max_skip = sim.max_window(consumed);
            let skip = scheduler::next_skip(sim.markets(), &sim.ctx.orders, consumed, max_skip);
            sim.step(consumed, consumed + skip)?;
            consumed += skip;
        }
        Ok(())
    }
}
