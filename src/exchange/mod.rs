//! Exchange Module
//!
//! Market access consumed by the pipeline and the laboratory:
//! - Last traded price
//! - Quote-currency balance
//! - Historical candles
//!
//! Every call degrades to a sentinel (0.0 or an empty list) instead of
//! returning an error; callers decide what a sentinel means.

pub mod bitget;

pub use bitget::BitgetClient;

/// Largest candle page a single request may ask for
pub const MAX_CANDLE_PAGE: usize = 1000;

use async_trait::async_trait;

use crate::utils::types::PriceBar;

/// Price returned when the market cannot be reached
pub const PRICE_SENTINEL: f64 = 0.0;
/// Balance returned when the account cannot be read
pub const BALANCE_SENTINEL: f64 = 0.0;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Last price for `symbol`, or [`PRICE_SENTINEL`]
    async fn get_price(&self, symbol: &str) -> f64;

    /// Total quote-currency balance, or [`BALANCE_SENTINEL`]
    async fn get_balance(&self) -> f64;

    /// Up to `limit` most recent bars, oldest first; empty on failure
    async fn get_candles(&self, symbol: &str, timeframe: &str, limit: usize) -> Vec<PriceBar>;
}
