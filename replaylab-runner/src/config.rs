//! Serializable backtest configuration.
//!
//! A [`BacktestConfig`] is read from TOML:
//!
//! ```toml
//! start_date = "2024-01-01"
//! finish_date = "2024-02-01"
//! mode = "adaptive"
//! warmup_candles = 240
//!
//! [exchange]
//! name = "Sandbox"
//! starting_balance = 10000.0
//! fee_rate = 0.0004
//! leverage = 2.0
//!
//! [[routes]]
//! exchange = "Sandbox"
//! symbol = "BTC-USDT"
//! timeframe = "1h"
//! strategy = "grid"
//! params = { levels = 3, spacing = 0.002, qty = 0.1 }
//!
//! [[extra_candles]]
//! exchange = "Sandbox"
//! symbol = "ETH-USDT"
//! timeframe = "4h"
//! ```
//!
//! `finish_date` is exclusive: the last simulated minute is 23:59 UTC of the
//! day before it.

use chrono::NaiveDate;
use replaylab_core::data::date_to_ms;
use replaylab_core::domain::{ExchangeSettings, ExtraCandle, MarketKey, Route, ONE_MINUTE_MS};
use replaylab_core::engine::SimulationMode;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Unique identifier for a backtest run (content-addressable hash).
pub type RunId = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("at least one route is required")]
    NoRoutes,

    #[error("duplicate route for {exchange}-{symbol} {timeframe}")]
    DuplicateRoute {
        exchange: String,
        symbol: String,
        timeframe: String,
    },

    #[error("{kind} on exchange '{exchange}' but only '{configured}' is configured")]
    UnknownExchange {
        kind: &'static str,
        exchange: String,
        configured: String,
    },

    #[error("invalid exchange setting {field} = {value}")]
    InvalidExchange { field: &'static str, value: f64 },
}

/// Complete description of one backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    /// First simulated day (inclusive, 00:00 UTC).
    pub start_date: NaiveDate,

    /// Day the simulation stops at (exclusive).
    pub finish_date: NaiveDate,

    #[serde(default)]
    pub mode: SimulationMode,

    /// 1-minute candles loaded before `start_date` and injected into the store.
    #[serde(default)]
    pub warmup_candles: usize,

    #[serde(default)]
    pub exchange: ExchangeSettings,

    #[serde(default)]
    pub routes: Vec<Route>,

    #[serde(default)]
    pub extra_candles: Vec<ExtraCandle>,
}

impl BacktestConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Structural checks that need no candle data.
    ///
    /// Date range checks happen when candles are loaded, since "finish in the
    /// future" depends on the day the run happens.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.routes.is_empty() {
            return Err(ConfigError::NoRoutes);
        }

        let mut seen = HashSet::new();
        for route in &self.routes {
            if !seen.insert((&route.exchange, &route.symbol, route.timeframe)) {
                return Err(ConfigError::DuplicateRoute {
                    exchange: route.exchange.clone(),
                    symbol: route.symbol.clone(),
                    timeframe: route.timeframe.to_string(),
                });
            }
            self.check_exchange("route", &route.exchange)?;
        }
        for extra in &self.extra_candles {
            self.check_exchange("extra candle", &extra.exchange)?;
        }

        let settings = &self.exchange;
        let checks = [
            ("starting_balance", settings.starting_balance, settings.starting_balance > 0.0),
            ("leverage", settings.leverage, settings.leverage >= 1.0),
            ("fee_rate", settings.fee_rate, settings.fee_rate >= 0.0),
            (
                "maintenance_margin_rate",
                settings.maintenance_margin_rate,
                (0.0..1.0).contains(&settings.maintenance_margin_rate),
            ),
        ];
        for (field, value, ok) in checks {
            if !ok {
                return Err(ConfigError::InvalidExchange { field, value });
            }
        }
        Ok(())
    }

    fn check_exchange(&self, kind: &'static str, exchange: &str) -> Result<(), ConfigError> {
        if exchange == self.exchange.name {
            Ok(())
        } else {
            Err(ConfigError::UnknownExchange {
                kind,
                exchange: exchange.to_string(),
                configured: self.exchange.name.clone(),
            })
        }
    }

    /// Deterministic hash ID for this configuration.
    ///
    /// Two runs with identical configs share the same ID.
    pub fn run_id(&self) -> Result<RunId, ConfigError> {
        let json = serde_json::to_string(self)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }

    /// Every market a route or extra candle subscribes to, in first-use order.
    pub fn market_keys(&self) -> Vec<MarketKey> {
        let mut keys: Vec<MarketKey> = Vec::new();
        let subscribed = self
            .routes
            .iter()
            .map(Route::market_key)
            .chain(self.extra_candles.iter().map(ExtraCandle::market_key));
        for key in subscribed {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }

    /// Timestamp of the first simulated minute.
    pub fn start_ms(&self) -> i64 {
        date_to_ms(self.start_date)
    }

    /// Timestamp of the last simulated minute.
    pub fn finish_ms(&self) -> i64 {
        date_to_ms(self.finish_date) - ONE_MINUTE_MS
    }
}
