//! Calculation Engines Module
//!
//! Pure, batch computations over price history:
//! - Column indicators (rolling mean, true range, channels)
//! - Breakout signal generation

pub mod indicators;
pub mod signal_engine;

pub use signal_engine::{SignalEngine, SignalError, SignalFrame};
