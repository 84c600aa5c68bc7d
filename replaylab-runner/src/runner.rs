//! Backtest runner — wires together config, candle loading, the strategy
//! factory and the simulation.
//!
//! Entry points:
//! - `run_single_backtest()`: validates, loads candles from a source, then runs. Used by the CLI.
//! - `run_backtest_from_data()`: takes pre-loaded candles. Used by sweeps.
//! - `run_batch()`: independent configs in parallel, each loading its own data.
//! - `run_sweep()`: one hyperparameter over many values on shared data, in parallel.

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use replaylab_core::data::{CandleSource, MarketCandles};
use replaylab_core::domain::Timeframe;
use replaylab_core::engine::{RouteBinding, RunResult, Simulation, SimulationError};

use crate::config::{BacktestConfig, ConfigError};
use crate::data_loader::{load_candles, LoadError, LoadOptions, LoadedCandles};
use crate::export::study_name;
use crate::strategies::{create_strategy, RegistryError};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
    #[error("strategy error: {0}")]
    Strategy(#[from] RegistryError),
    #[error("simulation error: {0}")]
    Simulation(#[from] SimulationError),
}

/// Current schema version for persisted reports.
pub const SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Buy-and-hold price move of one route's market over the simulated range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketChange {
    pub exchange: String,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub first_open: f64,
    pub last_close: f64,
    /// Percent change from `first_open` to `last_close`.
    pub change_pct: f64,
}

/// Complete result of a single backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: String,
    pub study_name: String,
    pub config: BacktestConfig,
    pub data_source: String,
    pub dataset_hash: String,
    pub result: RunResult,
    pub market_changes: Vec<MarketChange>,
}

impl BacktestReport {
    pub fn net_profit(&self) -> f64 {
        self.result.final_balance - self.result.starting_balance
    }

    pub fn net_profit_pct(&self) -> f64 {
        if self.result.starting_balance == 0.0 {
            return 0.0;
        }
        self.net_profit() / self.result.starting_balance * 100.0
    }
}

/// Validate `config`, load its candles from `source` and run it.
///
/// `today` bounds the finish date; pass the current UTC date outside tests.
pub fn run_single_backtest(
    config: &BacktestConfig,
    source: &dyn CandleSource,
    today: NaiveDate,
) -> Result<BacktestReport, RunError> {
    config.validate()?;
    let opts = LoadOptions {
        start: config.start_date,
        finish: config.finish_date,
        warmup_candles: config.warmup_candles,
        today,
    };
    let loaded = load_candles(source, &config.market_keys(), &opts)?;
    simulate(config, &loaded)
}

/// Run a backtest with pre-loaded candles, no I/O.
///
/// `loaded` must cover the config's markets and date range.
pub fn run_backtest_from_data(
    config: &BacktestConfig,
    loaded: &LoadedCandles,
) -> Result<BacktestReport, RunError> {
    config.validate()?;
    simulate(config, loaded)
}

fn simulate(config: &BacktestConfig, loaded: &LoadedCandles) -> Result<BacktestReport, RunError> {
    let routes = config
        .routes
        .iter()
        .map(|route| Ok(RouteBinding::new(route.clone(), create_strategy(route)?)))
        .collect::<Result<Vec<_>, RegistryError>>()?;

    let mut sim = Simulation::new(
        config.exchange.clone(),
        loaded.candles.clone(),
        routes,
        &config.extra_candles,
    )?;
    if !loaded.warmup.is_empty() {
        sim.inject_warmup(&loaded.warmup)?;
    }
    let result = sim.run(config.mode)?;

    Ok(BacktestReport {
        schema_version: SCHEMA_VERSION,
        run_id: config.run_id()?,
        study_name: study_name(config),
        config: config.clone(),
        data_source: loaded.source.clone(),
        dataset_hash: loaded.dataset_hash.clone(),
        market_changes: market_changes(config, &loaded.candles),
        result,
    })
}

/// First open vs last close per route, in route order.
fn market_changes(config: &BacktestConfig, candles: &[MarketCandles]) -> Vec<MarketChange> {
    config
        .routes
        .iter()
        .filter_map(|route| {
            let key = route.market_key();
            let series = &candles.iter().find(|m| m.key == key)?.candles;
            let first_open = series.first()?.open;
            let last_close = series.last()?.close;
            Some(MarketChange {
                exchange: route.exchange.clone(),
                symbol: route.symbol.clone(),
                timeframe: route.timeframe,
                first_open,
                last_close,
                change_pct: (last_close - first_open) / first_open * 100.0,
            })
        })
        .collect()
}

/// Run independent configs in parallel. Results keep the input order.
pub fn run_batch(
    configs: &[BacktestConfig],
    source: &dyn CandleSource,
    today: NaiveDate,
) -> Vec<Result<BacktestReport, RunError>> {
    tracing::info!(runs = configs.len(), "starting batch");
    configs
        .par_iter()
        .map(|config| run_single_backtest(config, source, today))
        .collect()
}

/// Copies of `base` with hyperparameter `param` set to each of `values` on every route.
pub fn sweep_configs(base: &BacktestConfig, param: &str, values: &[f64]) -> Vec<BacktestConfig> {
    values
        .iter()
        .map(|value| {
            let mut config = base.clone();
            for route in &mut config.routes {
                route.params.insert(param.to_string(), *value);
            }
            config
        })
        .collect()
}

/// Run one backtest per value of `param`, sharing `loaded` across all of them.
pub fn run_sweep(
    base: &BacktestConfig,
    loaded: &LoadedCandles,
    param: &str,
    values: &[f64],
) -> Vec<Result<BacktestReport, RunError>> {
    tracing::info!(param, runs = values.len(), "starting sweep");
    sweep_configs(base, param, values)
        .par_iter()
        .map(|config| run_backtest_from_data(config, loaded))
        .collect()
}
