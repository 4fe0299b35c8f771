//! Column-wise indicator helpers
//!
//! Every function maps a whole column to a column of the same length.
//! `None` marks warm-up positions where the window is not yet full.
//! Position `i` of an output only ever depends on inputs `0..=i`.

use crate::utils::types::PriceBar;

pub type Column = Vec<Option<f64>>;

/// Simple moving average over `window` values
pub fn rolling_mean(values: &[f64], window: usize) -> Column {
    let mut out = vec![None; values.len()];
    if window == 0 {
        return out;
    }

    for i in (window - 1)..values.len() {
        let sum: f64 = values[i + 1 - window..=i].iter().sum();
        out[i] = Some(sum / window as f64);
    }
    out
}

/// Rolling maximum over `window` values
pub fn rolling_max(values: &[f64], window: usize) -> Column {
    rolling_fold(values, window, f64::max)
}

/// Rolling minimum over `window` values
pub fn rolling_min(values: &[f64], window: usize) -> Column {
    rolling_fold(values, window, f64::min)
}

fn rolling_fold(values: &[f64], window: usize, f: fn(f64, f64) -> f64) -> Column {
    let mut out = vec![None; values.len()];
    if window == 0 {
        return out;
    }
    for i in (window - 1)..values.len() {
        let slice = &values[i + 1 - window..=i];
        out[i] = slice.iter().copied().reduce(f);
    }
    out
}

/// True range per bar; the first bar has no previous close and uses high - low
pub fn true_range(bars: &[PriceBar]) -> Vec<f64> {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            if i == 0 {
                bar.range()
            } else {
                bar.true_range(bars[i - 1].close)
            }
        })
        .collect()
}

/// Rolling mean of the true range
pub fn average_true_range(bars: &[PriceBar], window: usize) -> Column {
    rolling_mean(&true_range(bars), window)
}

/// Lag a column by `periods` positions, filling the head with `None`
pub fn shift(column: &[Option<f64>], periods: usize) -> Column {
    let mut out = vec![None; column.len()];
    for i in periods..column.len() {
        out[i] = column[i - periods];
    }
    out
}

/// Latest defined value of a column
pub fn last_value(column: &[Option<f64>]) -> Option<f64> {
    column.iter().rev().find_map(|v| *v)
}
