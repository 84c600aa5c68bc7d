//! ReplayLab Runner — backtest orchestration on top of `replaylab-core`.
//!
//! This crate provides:
//! - TOML configuration with validation and content-addressed run IDs
//! - Candle loading from CSV files or any other `CandleSource`, with warm-up
//! - The built-in strategy factory
//! - Single, batch and sweep runners (batches and sweeps run on rayon)
//! - JSON and CSV export of reports, trades and daily balances

pub mod config;
pub mod data_loader;
pub mod export;
pub mod runner;
pub mod strategies;

pub use config::{BacktestConfig, ConfigError, RunId};
pub use data_loader::{
    check_dates, load_candles, CsvCandleSource, LoadError, LoadOptions, LoadedCandles,
};
pub use export::{save_artifacts, study_name};
pub use runner::{
    run_backtest_from_data, run_batch, run_single_backtest, run_sweep, sweep_configs,
    BacktestReport, MarketChange, RunError, SCHEMA_VERSION,
};
pub use strategies::{create_strategy, RegistryError, STRATEGY_NAMES};
