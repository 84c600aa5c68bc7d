//! Simulation driver — owns the time loop and strategy cadence.
//!
//! A [`Simulation`] holds the 1-minute series of every tracked market, the
//! route bindings and the [`SimulationContext`]. The time loop itself is
//! pluggable through [`SimulationDriver`]:
//!
//! - [`AdaptiveDriver`] consumes windows of several minutes at once, sized by
//!   the skip-ahead scheduler.
//! - [`FixedStepDriver`] consumes one minute per step after repairing open
//!   gaps between consecutive candles.
//!
//! Both share [`Simulation::step`], which processes one window:
//!
//! 1. Advance the clock to the end of the window.
//! 2. Per market: store the window's leading minutes, match orders against
//!    the window's forming candle, commit the last minute, and aggregate
//!    every higher timeframe whose boundary just closed.
//! 3. Execute every route whose timeframe closed, then flush market orders.
//! 4. Snapshot the balance on day boundaries.

mod adaptive;
mod fixed_step;

pub use adaptive::AdaptiveDriver;
pub use fixed_step::{repair_jumped_candles, FixedStepDriver};

use super::aggregator;
use super::context::SimulationContext;
use super::error::SimulationError;
use super::matcher;
use super::strategy::Strategy;
use crate::data::MarketCandles;
use crate::domain::{
    CompletedTrade, ExchangeSettings, ExtraCandle, MarketKey, Route, Timeframe, ONE_MINUTE_MS,
};
use serde::{Deserialize, Serialize};

/// Minutes per day; balance snapshots are taken on these boundaries.
pub const MINUTES_PER_DAY: usize = 1440;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverState {
    WarmingUp,
    Running,
    Draining,
    Finished,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationMode {
    #[default]
    Adaptive,
    FixedStep,
}

/// The time loop of a simulation.
pub trait SimulationDriver {
    fn mode(&self) -> SimulationMode;

    /// Consume every minute of `sim`, calling [`Simulation::step`] per window.
    fn run_loop(&mut self, sim: &mut Simulation) -> Result<(), SimulationError>;
}

pub fn driver_for(mode: SimulationMode) -> Box<dyn SimulationDriver> {
    match mode {
        SimulationMode::Adaptive => Box::new(AdaptiveDriver),
        SimulationMode::FixedStep => Box::new(FixedStepDriver),
    }
}

/// A route together with its live strategy instance.
pub struct RouteBinding {
    pub route: Route,
    pub strategy: Box<dyn Strategy>,
}

impl RouteBinding {
    pub fn new(route: Route, strategy: Box<dyn Strategy>) -> Self {
        Self { route, strategy }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub mode: SimulationMode,
    pub state: DriverState,
    pub starting_time: i64,
    pub finish_time: i64,
    pub minutes_simulated: usize,
    /// Windows processed; equals `minutes_simulated` in fixed-step mode.
    pub steps: usize,
    pub starting_balance: f64,
    pub final_balance: f64,
    pub total_fees: f64,
    pub total_liquidations: usize,
    pub orders_executed: usize,
    pub trades: Vec<CompletedTrade>,
    pub daily_balances: Vec<f64>,
}

pub struct Simulation {
    pub ctx: SimulationContext,
    markets: Vec<MarketCandles>,
    /// Non-1m timeframes to aggregate, per market (parallel to `markets`).
    timeframes: Vec<Vec<Timeframe>>,
    routes: Vec<RouteBinding>,
    min_timeframe: Timeframe,
    state: DriverState,
    steps: usize,
}

impl Simulation {
    /// Validate the inputs and build a simulation in the `WarmingUp` state.
    ///
    /// Every market a route or extra candle refers to must be supplied, all
    /// series must start together, be gap-free and have equal length.
    /// Supplied markets nobody subscribes to are ignored.
    pub fn new(
        settings: ExchangeSettings,
        candles: Vec<MarketCandles>,
        routes: Vec<RouteBinding>,
        extra_candles: &[ExtraCandle],
    ) -> Result<Self, SimulationError> {
        let mut subscriptions: Vec<(MarketKey, Timeframe)> = routes
            .iter()
            .map(|b| (b.route.market_key(), b.route.timeframe))
            .collect();
        subscriptions.extend(extra_candles.iter().map(|e| (e.market_key(), e.timeframe)));

        let min_timeframe = subscriptions
            .iter()
            .map(|(_, tf)| *tf)
            .fold(Timeframe::W1, Timeframe::min);

        let mut supplied = candles;
        let mut markets: Vec<MarketCandles> = Vec::new();
        let mut timeframes: Vec<Vec<Timeframe>> = Vec::new();
        for (key, tf) in &subscriptions {
            let index = match markets.iter().position(|m| &m.key == key) {
                Some(index) => index,
                None => {
                    let pos = supplied
                        .iter()
                        .position(|m| &m.key == key)
                        .ok_or_else(|| SimulationError::MissingMarketCandles(key.clone()))?;
                    markets.push(supplied.swap_remove(pos));
                    timeframes.push(Vec::new());
                    markets.len() - 1
                }
            };
            if *tf != Timeframe::M1 && !timeframes[index].contains(tf) {
                timeframes[index].push(*tf);
            }
        }
        for tfs in &mut timeframes {
            tfs.sort();
        }
        for ignored in &supplied {
            tracing::debug!("ignoring candles for {}, no route or extra candle uses them", ignored.key);
        }

        let first = markets.first().ok_or(SimulationError::NoCandles)?;
        let starting_time = first
            .candles
            .first()
            .map(|c| c.timestamp)
            .ok_or(SimulationError::NoCandles)?;
        let length = first.len();
        for market in &markets {
            validate_series(market, starting_time, length)?;
        }

        let mut ctx = SimulationContext::new(settings, starting_time, length);
        for market in &markets {
            ctx.orders.register_market(&market.key);
        }

        Ok(Self {
            ctx,
            markets,
            timeframes,
            routes,
            min_timeframe,
            state: DriverState::WarmingUp,
            steps: 0,
        })
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn markets(&self) -> &[MarketCandles] {
        &self.markets
    }

    pub fn routes(&self) -> &[RouteBinding] {
        &self.routes
    }

    pub fn min_timeframe(&self) -> Timeframe {
        self.min_timeframe
    }

    /// Number of 1-minute candles to simulate.
    pub fn len(&self) -> usize {
        self.markets.first().map_or(0, MarketCandles::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Store warm-up candles that precede the simulated range.
    ///
    /// Each series must end exactly one minute before the first simulated
    /// candle. The 1-minute candles are stored as-is; every higher timeframe
    /// is aggregated backwards from the end, dropping a leading partial chunk.
    pub fn inject_warmup(&mut self, warmup: &[MarketCandles]) -> Result<(), SimulationError> {
        self.expect_state(DriverState::WarmingUp)?;
        let starting_time = self.ctx.clock.starting_time();

        for series in warmup {
            let Some(index) = self.markets.iter().position(|m| m.key == series.key) else {
                tracing::debug!("ignoring warm-up candles for untracked market {}", series.key);
                continue;
            };
            if series.is_empty() {
                continue;
            }
            let expected_first = starting_time - series.len() as i64 * ONE_MINUTE_MS;
            for (i, candle) in series.candles.iter().enumerate() {
                let expected = expected_first + i as i64 * ONE_MINUTE_MS;
                if candle.timestamp != expected {
                    return Err(SimulationError::MisalignedCandles {
                        key: series.key.clone(),
                        index: i,
                        expected,
                        actual: candle.timestamp,
                    });
                }
            }

            self.ctx
                .candles
                .add_candles(&series.key, Timeframe::M1, &series.candles)?;
            for tf in &self.timeframes[index] {
                let n = tf.minutes();
                let offset = series.len() % n;
                for chunk in series.candles[offset..].chunks(n) {
                    let candle = aggregator::aggregate(*tf, chunk, false)?;
                    self.ctx.candles.add_candle(&series.key, *tf, candle)?;
                }
            }
            tracing::debug!("{}: injected {} warm-up candles", series.key, series.len());
        }
        Ok(())
    }

    /// Run the simulation to completion with the driver for `mode`.
    pub fn run(&mut self, mode: SimulationMode) -> Result<RunResult, SimulationError> {
        let mut driver = driver_for(mode);
        self.run_with(driver.as_mut())
    }

    /// Run the simulation to completion with an explicit driver.
    ///
    /// Any error moves the simulation to `Failed` and is returned as-is.
    pub fn run_with(
        &mut self,
        driver: &mut dyn SimulationDriver,
    ) -> Result<RunResult, SimulationError> {
        self.expect_state(DriverState::WarmingUp)?;
        tracing::info!(
            mode = ?driver.mode(),
            markets = self.markets.len(),
            routes = self.routes.len(),
            minutes = self.len(),
            "starting simulation"
        );

        self.state = DriverState::Running;
        self.ctx.snapshot_balance();

        let outcome = match driver.run_loop(self) {
            Ok(()) => self.finish(),
            Err(e) => Err(e),
        };
        if let Err(e) = outcome {
            self.state = DriverState::Failed;
            tracing::warn!("simulation failed: {e}");
            return Err(e);
        }

        let result = self.result(driver.mode());
        tracing::info!(
            steps = result.steps,
            trades = result.trades.len(),
            liquidations = result.total_liquidations,
            final_balance = result.final_balance,
            "simulation finished"
        );
        Ok(result)
    }

    /// Process the window of 1-minute candles `[start, end)`.
    ///
    /// `end` is the number of candles consumed once the window is done.
    pub fn step(&mut self, start: usize, end: usize) -> Result<(), SimulationError> {
        self.expect_state(DriverState::Running)?;
        let len = self.len();
        if start >= end || end > len {
            return Err(SimulationError::InvalidWindow { start, end, len });
        }
        let last_ts = self.markets[0].candles[end - 1].timestamp;
        self.ctx.clock.advance_to(last_ts + ONE_MINUTE_MS)?;

        // ─── Candles and fills ───
        for (market, timeframes) in self.markets.iter().zip(&self.timeframes) {
            let key = &market.key;
            let window = &market.candles[start..end];
            let Some((last, head)) = window.split_last() else {
                continue;
            };
            self.ctx.candles.add_candles(key, Timeframe::M1, head)?;

            let mut step_candle = aggregator::forming(window)?;
            step_candle.timestamp = last.timestamp;
            matcher::simulate_price_change(&mut self.ctx, key, &step_candle, last)?;

            for tf in timeframes {
                let n = tf.minutes();
                if end % n == 0 {
                    let candle = aggregator::aggregate(*tf, &market.candles[end - n..end], false)?;
                    self.ctx.candles.add_candle(key, *tf, candle)?;
                }
            }
        }

        // ─── Strategies ───
        for binding in &mut self.routes {
            let route = &binding.route;
            if end % route.timeframe.minutes() != 0 {
                continue;
            }
            let key = route.market_key();
            let available = self.ctx.candles.len(&key, route.timeframe);
            let required = binding.strategy.required_candles();
            if available < required {
                tracing::debug!(
                    "{key} {}: {available}/{required} candles, skipping {}",
                    route.timeframe,
                    binding.strategy.name()
                );
                continue;
            }
            binding.strategy.execute(route, &mut self.ctx)?;
            self.ctx.execute_pending_market_orders()?;
        }

        // ─── Daily snapshot ───
        if end % MINUTES_PER_DAY == 0 {
            self.ctx.snapshot_balance();
        }

        self.steps += 1;
        Ok(())
    }

    /// Largest window starting at `consumed` that crosses no timeframe
    /// boundary, no day boundary and not the end of data.
    pub fn max_window(&self, consumed: usize) -> usize {
        let boundary = self
            .timeframes
            .iter()
            .flatten()
            .copied()
            .chain(std::iter::once(self.min_timeframe))
            .map(|tf| tf.minutes() - consumed % tf.minutes())
            .min()
            .unwrap_or(1);
        boundary
            .min(MINUTES_PER_DAY - consumed % MINUTES_PER_DAY)
            .min(self.len().saturating_sub(consumed))
            .max(1)
    }

    fn finish(&mut self) -> Result<(), SimulationError> {
        self.state = DriverState::Draining;
        for binding in &mut self.routes {
            binding.strategy.terminate(&binding.route, &mut self.ctx)?;
            self.ctx.execute_pending_market_orders()?;
        }
        self.ctx.snapshot_balance();
        self.state = DriverState::Finished;
        Ok(())
    }

    fn result(&self, mode: SimulationMode) -> RunResult {
        let orders_executed = self
            .ctx
            .orders
            .markets()
            .iter()
            .map(|key| self.ctx.orders.orders(key).iter().filter(|o| o.is_executed()).count())
            .sum();
        RunResult {
            mode,
            state: self.state,
            starting_time: self.ctx.clock.starting_time(),
            finish_time: self.ctx.now(),
            minutes_simulated: self.len(),
            steps: self.steps,
            starting_balance: self.ctx.portfolio.settings.starting_balance,
            final_balance: self.ctx.portfolio.total_balance(),
            total_fees: self.ctx.portfolio.total_fees,
            total_liquidations: self.ctx.total_liquidations,
            orders_executed,
            trades: self.ctx.portfolio.trades.clone(),
            daily_balances: self.ctx.daily_balances.clone(),
        }
    }

    fn expect_state(&self, expected: DriverState) -> Result<(), SimulationError> {
        if self.state != expected {
            return Err(SimulationError::InvalidState {
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }
}

fn validate_series(
    market: &MarketCandles,
    starting_time: i64,
    length: usize,
) -> Result<(), SimulationError> {
    if market.len() != length {
        let index = market.len().min(length);
        return Err(SimulationError::MisalignedCandles {
            key: market.key.clone(),
            index,
            expected: starting_time + index as i64 * ONE_MINUTE_MS,
            actual: market
                .candles
                .get(index)
                .map_or(i64::MIN, |c| c.timestamp),
        });
    }
    for (i, candle) in market.candles.iter().enumerate() {
        let expected = starting_time + i as i64 * ONE_MINUTE_MS;
        if candle.timestamp != expected {
            return Err(SimulationError::MisalignedCandles {
                key: market.key.clone(),
                index: i,
                expected,
                actual: candle.timestamp,
            });
        }
        candle
            .validate()
            .map_err(|source| SimulationError::InvalidCandle {
                key: market.key.clone(),
                source,
            })?;
    }
    Ok(())
}
