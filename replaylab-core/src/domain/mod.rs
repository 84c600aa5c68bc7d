//! Domain types for replaylab

pub mod candle;
pub mod ids;
pub mod order;
pub mod portfolio;
pub mod position;
pub mod route;
pub mod timeframe;
pub mod trade;

pub use candle::{Candle, CandleError, ONE_MINUTE_MS};
pub use ids::{IdGen, MarketKey, OrderId};
pub use order::{prepare_qty, Order, OrderFlag, OrderKind, OrderRole, OrderSide, OrderStatus};
pub use portfolio::{ExchangeSettings, Portfolio};
pub use position::{FillOutcome, MarginMode, Position, PositionSide};
pub use route::{ExtraCandle, Route};
pub use timeframe::{ParseTimeframeError, Timeframe};
pub use trade::CompletedTrade;
