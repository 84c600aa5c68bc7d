//! ReplayLab CLI — run, sweep and inspect minute-resolution backtests.
//!
//! Commands:
//! - `run` — execute a backtest from a TOML config and save its artifacts
//! - `sweep` — run one hyperparameter over several values in parallel
//! - `validate` — check a config and print its run ID
//! - `generate` — write seeded synthetic candles as CSV files for a config
//! - `strategies` — list built-in strategy names

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use replaylab_core::data::{date_to_ms, CandleSource, SyntheticSource};
use replaylab_core::domain::ONE_MINUTE_MS;
use replaylab_runner::{
    load_candles, run_single_backtest, run_sweep, save_artifacts, BacktestConfig, BacktestReport,
    CsvCandleSource, LoadOptions, STRATEGY_NAMES,
};

#[derive(Parser)]
#[command(
    name = "replaylab",
    about = "ReplayLab CLI — minute-resolution backtest simulator"
)]
struct Cli {
    /// Log at debug level unless RUST_LOG is set.
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a backtest from a TOML config file.
    Run {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// Directory holding `<exchange>/<symbol>.csv` candle files.
        #[arg(long, default_value = "data")]
        candles_dir: PathBuf,

        /// Use seeded synthetic candles instead of CSV files.
        #[arg(long, default_value_t = false)]
        synthetic: bool,

        /// Seed for --synthetic.
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Output directory for artifacts.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,

        /// Print the full report as JSON instead of the summary.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Run one hyperparameter over several values on shared candles.
    Sweep {
        #[arg(long)]
        config: PathBuf,

        /// Hyperparameter name, set on every route.
        #[arg(long)]
        param: String,

        /// Comma-separated values (e.g. 0.001,0.002,0.004).
        #[arg(long, value_delimiter = ',', required = true)]
        values: Vec<f64>,

        #[arg(long, default_value = "data")]
        candles_dir: PathBuf,

        #[arg(long, default_value_t = false)]
        synthetic: bool,

        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// Validate a config and print its run ID.
    Validate {
        #[arg(long)]
        config: PathBuf,
    },
    /// Write synthetic candles (including warm-up) for every market in a config.
    Generate {
        #[arg(long)]
        config: PathBuf,

        #[arg(long, default_value = "data")]
        candles_dir: PathBuf,

        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// List built-in strategies.
    Strategies,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            config,
            candles_dir,
            synthetic,
            seed,
            output_dir,
            json,
        } => run_backtest_cmd(&config, &candles_dir, synthetic, seed, &output_dir, json),
        Commands::Sweep {
            config,
            param,
            values,
            candles_dir,
            synthetic,
            seed,
        } => run_sweep_cmd(&config, &param, &values, &candles_dir, synthetic, seed),
        Commands::Validate { config } => run_validate(&config),
        Commands::Generate {
            config,
            candles_dir,
            seed,
        } => run_generate(&config, &candles_dir, seed),
        Commands::Strategies => {
            for name in STRATEGY_NAMES {
                println!("{name}");
            }
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .init();
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn load_config(path: &Path) -> Result<BacktestConfig> {
    tracing::debug!(path = %path.display(), "loading config");
    let config = BacktestConfig::from_file(path)
        .with_context(|| format!("failed to load config {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

fn candle_source(candles_dir: &Path, synthetic: bool, seed: u64) -> Result<Box<dyn CandleSource>> {
    if synthetic {
        eprintln!("WARNING: using synthetic candles (seed {seed})");
        return Ok(Box::new(SyntheticSource::new(seed)));
    }
    if !candles_dir.is_dir() {
        bail!(
            "candle directory {} does not exist (use --synthetic or `replaylab generate`)",
            candles_dir.display()
        );
    }
    Ok(Box::new(CsvCandleSource::new(candles_dir)))
}

fn run_backtest_cmd(
    config_path: &Path,
    candles_dir: &Path,
    synthetic: bool,
    seed: u64,
    output_dir: &Path,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let source = candle_source(candles_dir, synthetic, seed)?;

    let report = run_single_backtest(&config, source.as_ref(), today())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }

    let path = save_artifacts(&report, output_dir)?;
    eprintln!("Artifacts saved to: {}", path.display());
    Ok(())
}

fn run_sweep_cmd(
    config_path: &Path,
    param: &str,
    values: &[f64],
    candles_dir: &Path,
    synthetic: bool,
    seed: u64,
) -> Result<()> {
    let config = load_config(config_path)?;
    let source = candle_source(candles_dir, synthetic, seed)?;
    let opts = LoadOptions {
        start: config.start_date,
        finish: config.finish_date,
        warmup_candles: config.warmup_candles,
        today: today(),
    };
    let loaded = load_candles(source.as_ref(), &config.market_keys(), &opts)?;

    println!(
        "{:>14}  {:>14}  {:>10}  {:>8}  {:>6}",
        param, "final balance", "net %", "trades", "liq"
    );
    for (value, result) in values.iter().zip(run_sweep(&config, &loaded, param, values)) {
        match result {
            Ok(report) => println!(
                "{:>14}  {:>14.2}  {:>9.2}%  {:>8}  {:>6}",
                value,
                report.result.final_balance,
                report.net_profit_pct(),
                report.result.trades.len(),
                report.result.total_liquidations
            ),
            Err(e) => println!("{value:>14}  error: {e}"),
        }
    }
    Ok(())
}

fn run_validate(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    println!("config OK");
    println!("run id:   {}", config.run_id()?);
    println!("period:   {} to {}", config.start_date, config.finish_date);
    println!("routes:   {}", config.routes.len());
    println!("markets:  {}", config.market_keys().len());
    Ok(())
}

fn run_generate(config_path: &Path, candles_dir: &Path, seed: u64) -> Result<()> {
    let config = load_config(config_path)?;
    let synthetic = SyntheticSource::new(seed);
    let csv = CsvCandleSource::new(candles_dir);

    let start = date_to_ms(config.start_date) - config.warmup_candles as i64 * ONE_MINUTE_MS;
    for key in config.market_keys() {
        let candles = synthetic.fetch(&key, start, config.finish_ms())?;
        let path = csv.store(&key, &candles)?;
        println!("{key}: {} candles -> {}", candles.len(), path.display());
    }
    Ok(())
}

fn print_summary(report: &BacktestReport) {
    let r = &report.result;
    println!();
    println!("=== Backtest Result ===");
    println!("Study:          {}", report.study_name);
    println!(
        "Period:         {} to {}",
        report.config.start_date, report.config.finish_date
    );
    println!("Mode:           {:?} ({} steps)", r.mode, r.steps);
    println!(
        "Minutes:        {} ({} warmup)",
        r.minutes_simulated, report.config.warmup_candles
    );
    println!(
        "Data:           {} ({})",
        report.data_source,
        report.dataset_hash.get(..12).unwrap_or(&report.dataset_hash)
    );
    println!();
    println!("--- Account ---");
    println!("Start Balance:  {:.2}", r.starting_balance);
    println!("Final Balance:  {:.2}", r.final_balance);
    println!("Net Profit:     {:.2} ({:.2}%)", report.net_profit(), report.net_profit_pct());
    println!("Fees:           {:.2}", r.total_fees);
    println!("Orders:         {}", r.orders_executed);
    println!("Trades:         {}", r.trades.len());
    println!("Liquidations:   {}", r.total_liquidations);
    if !report.market_changes.is_empty() {
        println!();
        println!("--- Market Change ---");
        for change in &report.market_changes {
            println!(
                "{}-{} {}: {:.2}%",
                change.exchange, change.symbol, change.timeframe, change.change_pct
            );
        }
    }
    if report.data_source == "synthetic" {
        println!();
        println!("WARNING: Results based on SYNTHETIC data");
    }
}
