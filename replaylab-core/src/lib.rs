//! ReplayLab Core — minute-resolution backtest simulation engine.
//!
//! This crate contains:
//! - Domain types (candles, timeframes, orders, positions, portfolio, routes)
//! - Timeframe aggregation and the per-market candle store
//! - Intra-candle price-path matching with insertion-order fill priority
//! - Isolated-margin liquidation monitor
//! - Adaptive skip-ahead scheduler and the two simulation drivers
//! - Candle source trait, validation and a synthetic generator

pub mod data;
pub mod domain;
pub mod engine;
