//! Helper functions

use std::time::{SystemTime, UNIX_EPOCH};

pub fn current_timestamp_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

pub fn format_price(price: f64) -> String {
    if price >= 1000.0 {
        format!("{:.2}", price)
    } else if price >= 1.0 {
        format!("{:.4}", price)
    } else {
        format!("{:.6}", price)
    }
}

pub fn format_usd(amount: f64) -> String {
    if amount.abs() >= 1_000_000.0 {
        format!("${:.2}M", amount / 1_000_000.0)
    } else if amount.abs() >= 1_000.0 {
        format!("${:.2}K", amount / 1_000.0)
    } else {
        format!("${:.2}", amount)
    }
}

/// Exchange-style pair ("SOL/USDT") to the compact form most REST APIs want ("SOLUSDT")
pub fn compact_symbol(symbol: &str) -> String {
    symbol
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_uppercase()
}
