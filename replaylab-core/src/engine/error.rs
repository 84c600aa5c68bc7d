use super::aggregator::AggregateError;
use super::candle_store::CandleStoreError;
use super::clock::ClockRewind;
use super::driver::DriverState;
use super::order_book::OrderBookError;
use super::strategy::StrategyError;
use crate::domain::{CandleError, MarketKey};
use thiserror::Error;

/// Every way a simulation can fail. All of them are fatal for the run.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("no candles were supplied to the simulation")]
    NoCandles,

    #[error("no candles supplied for {0}, which a route or extra candle subscribes to")]
    MissingMarketCandles(MarketKey),

    #[error("{key}: candle {index} has timestamp {actual}, expected {expected}")]
    MisalignedCandles {
        key: MarketKey,
        index: usize,
        expected: i64,
        actual: i64,
    },

    #[error("{key}: {source}")]
    InvalidCandle {
        key: MarketKey,
        #[source]
        source: CandleError,
    },

    #[error("window [{start}, {end}) is empty or past the end of {len} candles")]
    InvalidWindow { start: usize, end: usize, len: usize },

    #[error("no price known yet for {0}")]
    NoMarketPrice(MarketKey),

    #[error("invalid order on {key}: {reason}")]
    InvalidOrder { key: MarketKey, reason: String },

    #[error("simulation is {actual:?}, expected {expected:?}")]
    InvalidState {
        expected: DriverState,
        actual: DriverState,
    },

    #[error("aggregation failed: {0}")]
    Aggregate(#[from] AggregateError),

    #[error("candle store: {0}")]
    CandleStore(#[from] CandleStoreError),

    #[error("order book: {0}")]
    OrderBook(#[from] OrderBookError),

    #[error(transparent)]
    Clock(#[from] ClockRewind),

    #[error(transparent)]
    Strategy(#[from] StrategyError),
}
