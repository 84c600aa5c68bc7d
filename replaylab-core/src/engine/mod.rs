//! Simulation engine — time loop, candle aggregation and order matching.
//!
//! Every iteration of the loop consumes a window of 1-minute candles:
//!
//! 1. Store the window and aggregate every timeframe whose boundary closed
//! 2. Resolve fills along the inferred intra-candle price path
//! 3. Check isolated positions for liquidation after each fill
//! 4. Run the strategies whose timeframe closed and flush market orders
//! 5. Ask the scheduler how far the next window may reach

pub mod aggregator;
pub mod candle_store;
pub mod clock;
pub mod context;
pub mod driver;
pub mod error;
pub mod liquidation;
pub mod matcher;
pub mod order_book;
pub mod scheduler;
pub mod strategy;

pub use aggregator::{aggregate, forming, AggregateError};
pub use candle_store::{CandleStore, CandleStoreError};
pub use clock::{ClockRewind, SimulationClock};
pub use context::SimulationContext;
pub use driver::{
    driver_for, repair_jumped_candles, AdaptiveDriver, DriverState, FixedStepDriver,
    RouteBinding, RunResult, Simulation, SimulationDriver, SimulationMode, MINUTES_PER_DAY,
};
pub use error::SimulationError;
pub use matcher::{simulate_price_change, split_candle, Fill, MatchReport};
pub use order_book::{OrderBook, OrderBookError};
pub use scheduler::next_skip;
pub use strategy::{NullStrategy, Strategy, StrategyError};
