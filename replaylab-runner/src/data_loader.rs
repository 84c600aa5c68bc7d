//! Candle loading for the runner.
//!
//! Resolves every market a config subscribes to through a [`CandleSource`]
//! and enforces the load preconditions:
//! 1. `start_date` must be before `finish_date`
//! 2. `finish_date` must not be in the future
//! 3. each series must cover exactly `[start, finish)` minute by minute
//!
//! Warm-up candles are fetched in the same request as the simulated range so
//! that sources which generate data (synthetic walks) stay continuous across
//! the `start_date` boundary.

use chrono::NaiveDate;
use replaylab_core::data::{
    date_to_ms, validate_bounds, validate_contiguous, CandleSource, DataError, MarketCandles,
};
use replaylab_core::domain::{Candle, MarketKey, ONE_MINUTE_MS};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("start date {0} is equal to finish date; the backtest needs at least one day")]
    StartEqualsFinish(NaiveDate),

    #[error("start date {start} is after finish date {finish}")]
    StartAfterFinish { start: NaiveDate, finish: NaiveDate },

    #[error("finish date {finish} is in the future (today is {today}); candles cannot be loaded")]
    FinishInFuture { finish: NaiveDate, today: NaiveDate },

    #[error("data error: {0}")]
    Data(#[from] DataError),
}

/// Options controlling what range is loaded.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// First simulated day (inclusive).
    pub start: NaiveDate,
    /// Day the simulation stops at (exclusive).
    pub finish: NaiveDate,
    /// 1-minute candles to load before `start`.
    pub warmup_candles: usize,
    /// Reference date for the "finish in the future" check.
    pub today: NaiveDate,
}

/// Result of loading candles, with provenance.
#[derive(Debug, Clone)]
pub struct LoadedCandles {
    /// Simulated range, one entry per requested market.
    pub candles: Vec<MarketCandles>,
    /// Warm-up series ending one minute before the first simulated minute.
    /// Empty when no warm-up was requested.
    pub warmup: Vec<MarketCandles>,
    /// Name of the source the candles came from.
    pub source: String,
    /// BLAKE3 over every loaded candle, in request order.
    pub dataset_hash: String,
}

pub fn check_dates(start: NaiveDate, finish: NaiveDate, today: NaiveDate) -> Result<(), LoadError> {
    if start == finish {
        return Err(LoadError::StartEqualsFinish(start));
    }
    if start > finish {
        return Err(LoadError::StartAfterFinish { start, finish });
    }
    if finish > today {
        return Err(LoadError::FinishInFuture { finish, today });
    }
    Ok(())
}

/// Load the simulated range (and warm-up) for every market in `keys`.
pub fn load_candles(
    source: &dyn CandleSource,
    keys: &[MarketKey],
    opts: &LoadOptions,
) -> Result<LoadedCandles, LoadError> {
    check_dates(opts.start, opts.finish, opts.today)?;

    let start_ms = date_to_ms(opts.start);
    let finish_ms = date_to_ms(opts.finish) - ONE_MINUTE_MS;
    let warmup_ms = opts.warmup_candles as i64 * ONE_MINUTE_MS;

    let mut candles = Vec::with_capacity(keys.len());
    let mut warmup = Vec::new();
    for key in keys {
        let mut series = source.fetch(key, start_ms - warmup_ms, finish_ms)?;
        validate_bounds(key, &series, start_ms - warmup_ms, finish_ms)?;
        validate_contiguous(key, &series)?;

        let simulated = series.split_off(opts.warmup_candles);
        if opts.warmup_candles > 0 {
            warmup.push(MarketCandles::new(key.clone(), series));
        }
        candles.push(MarketCandles::new(key.clone(), simulated));
    }

    let dataset_hash = compute_dataset_hash(&warmup, &candles);
    tracing::info!(
        source = source.name(),
        markets = keys.len(),
        minutes = candles.first().map_or(0, MarketCandles::len),
        warmup = opts.warmup_candles,
        "candles loaded"
    );

    Ok(LoadedCandles {
        candles,
        warmup,
        source: source.name().to_string(),
        dataset_hash,
    })
}

/// Deterministic BLAKE3 hash over market keys and OHLCV values.
fn compute_dataset_hash(warmup: &[MarketCandles], candles: &[MarketCandles]) -> String {
    let mut hasher = blake3::Hasher::new();
    for market in warmup.iter().chain(candles) {
        hasher.update(market.key.exchange.as_bytes());
        hasher.update(market.key.symbol.as_bytes());
        for c in &market.candles {
            hasher.update(&c.timestamp.to_le_bytes());
            hasher.update(&c.open.to_le_bytes());
            hasher.update(&c.close.to_le_bytes());
            hasher.update(&c.high.to_le_bytes());
            hasher.update(&c.low.to_le_bytes());
            hasher.update(&c.volume.to_le_bytes());
        }
    }
    hasher.finalize().to_hex().to_string()
}

// ─── CSV source ──────────────────────────────────────────────────────

/// 1-minute candles stored as one CSV file per market.
///
/// Layout is `<dir>/<exchange>/<symbol>.csv` with the header
/// `timestamp,open,close,high,low,volume`. Rows may be in any order.
#[derive(Debug, Clone)]
pub struct CsvCandleSource {
    dir: PathBuf,
}

impl CsvCandleSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, key: &MarketKey) -> PathBuf {
        self.dir
            .join(&key.exchange)
            .join(format!("{}.csv", key.symbol))
    }

    /// Write `candles` as the CSV file for `key`, replacing any existing file.
    pub fn store(&self, key: &MarketKey, candles: &[Candle]) -> Result<PathBuf, DataError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }
        let mut writer = csv::Writer::from_path(&path).map_err(|e| io_error(&path, e))?;
        for candle in candles {
            writer.serialize(candle).map_err(|e| io_error(&path, e))?;
        }
        writer.flush().map_err(|e| io_error(&path, e))?;
        Ok(path)
    }
}

impl CandleSource for CsvCandleSource {
    fn name(&self) -> &str {
        "csv"
    }

    fn fetch(&self, key: &MarketKey, start_ms: i64, end_ms: i64) -> Result<Vec<Candle>, DataError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Err(DataError::MarketNotFound { key: key.clone() });
        }
        let mut reader = csv::Reader::from_path(&path).map_err(|e| io_error(&path, e))?;

        let mut candles = Vec::new();
        for row in reader.deserialize::<Candle>() {
            let candle = row.map_err(|e| DataError::Parse {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
            if (start_ms..=end_ms).contains(&candle.timestamp) {
                candles.push(candle);
            }
        }
        candles.sort_by_key(|c| c.timestamp);
        Ok(candles)
    }
}

fn io_error(path: &Path, err: impl std::fmt::Display) -> DataError {
    DataError::Io {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}
