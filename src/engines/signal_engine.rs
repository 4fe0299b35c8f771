//! Signal Generation Engine
//!
//! Derives breakout entries from a full price table in one pass:
//! - Compression breakout: a tight channel hugging the trend average, then a
//!   close above the channel
//! - Paired-indecision breakout: two small-body bars on the trend average,
//!   then a close above both
//!
//! Exit fires when the close drops below the trend average.

use thiserror::Error;

use crate::config::SignalConfig;
use crate::utils::types::PriceSeries;

use super::indicators::{self, Column};

#[derive(Debug, Error, PartialEq)]
pub enum SignalError {
    #[error("insufficient history: {bars} bars < minimum {min_bars}")]
    InsufficientHistory { bars: usize, min_bars: usize },
}

/// Every derived column plus the final flags, index-aligned with the input series
#[derive(Debug, Clone, PartialEq)]
pub struct SignalFrame {
    /// Rolling mean of closes
    pub trend: Column,
    /// Rolling mean of true range
    pub volatility: Column,
    /// Highest high of the previous channel window (current bar excluded)
    pub channel_high: Column,
    /// Lowest low of the previous channel window (current bar excluded)
    pub channel_low: Column,
    pub channel_height: Column,
    pub channel_center: Column,
    /// |channel centre - trend|
    pub trend_distance: Column,
    pub indecisive: Vec<bool>,
    pub compression_breakout: Vec<bool>,
    pub indecision_breakout: Vec<bool>,
    pub entry: Vec<bool>,
    pub exit: Vec<bool>,
}

impl SignalFrame {
    pub fn len(&self) -> usize {
        self.entry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entry.is_empty()
    }

    pub fn entry_count(&self) -> usize {
        self.entry.iter().filter(|e| **e).count()
    }
}

/// Vectorized pattern detector
#[derive(Debug, Clone)]
pub struct SignalEngine {
    config: SignalConfig,
}

impl SignalEngine {
    pub fn new(config: SignalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    pub fn min_bars(&self) -> usize {
        self.config.min_bars
    }

    /// Compute all derived columns and entry/exit flags
    pub fn compute(&self, series: &PriceSeries) -> Result<SignalFrame, SignalError> {
        if series.len() < self.config.min_bars {
            return Err(SignalError::InsufficientHistory {
                bars: series.len(),
                min_bars: self.config.min_bars,
            });
        }

        let bars = series.bars();
        let n = bars.len();
        let closes = series.closes();
        let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
        let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();

        let trend = indicators::rolling_mean(&closes, self.config.trend_window);
        let volatility = indicators::average_true_range(bars, self.config.volatility_window);

        // Channel of the window ending on the previous bar
        let channel_high = indicators::shift(
            &indicators::rolling_max(&highs, self.config.channel_window),
            1,
        );
        let channel_low = indicators::shift(
            &indicators::rolling_min(&lows, self.config.channel_window),
            1,
        );

        let channel_height = zip_with(&channel_high, &channel_low, |h, l| h - l);
        let channel_center = zip_with(&channel_high, &channel_low, |h, l| (h + l) / 2.0);
        let trend_distance = zip_with(&channel_center, &trend, |c, t| (c - t).abs());

        let ratio = self.config.indecision_body_ratio;
        let indecisive: Vec<bool> = bars
            .iter()
            .map(|b| {
                let range = b.range();
                range > 0.0 && b.body() <= range * ratio
            })
            .collect();

        let prev_volatility = indicators::shift(&volatility, 1);

        let mut compression_breakout = vec![false; n];
        let mut indecision_breakout = vec![false; n];

        for i in 0..n {
            compression_breakout[i] = match (
                channel_height[i],
                trend_distance[i],
                channel_high[i],
                prev_volatility[i],
            ) {
                (Some(height), Some(distance), Some(upper), Some(vol)) => {
                    height < vol * self.config.compression_multiple
                        && distance < vol * self.config.proximity_multiple
                        && bars[i].close > upper
                }
                _ => false,
            };

            if i >= 2 {
                let (a, b) = (i - 2, i - 1);
                let touches = |j: usize| {
                    trend[j].is_some_and(|t| bars[j].low <= t && t <= bars[j].high)
                };
                let pair_high = bars[a].high.max(bars[b].high);
                indecision_breakout[i] = indecisive[a]
                    && indecisive[b]
                    && (touches(a) || touches(b))
                    && bars[i].close > pair_high;
            }
        }

        let entry: Vec<bool> = compression_breakout
            .iter()
            .zip(&indecision_breakout)
            .map(|(c, d)| *c || *d)
            .collect();

        let exit: Vec<bool> = bars
            .iter()
            .zip(&trend)
            .map(|(bar, t)| t.is_some_and(|t| bar.close < t))
            .collect();

        Ok(SignalFrame {
            trend,
            volatility,
            channel_high,
            channel_low,
            channel_height,
            channel_center,
            trend_distance,
            indecisive,
            compression_breakout,
            indecision_breakout,
            entry,
            exit,
        })
    }
}

fn zip_with(a: &[Option<f64>], b: &[Option<f64>], f: impl Fn(f64, f64) -> f64) -> Column {
    a.iter()
        .zip(b)
        .map(|(x, y)| match (x, y) {
            (Some(x), Some(y)) => Some(f(*x, *y)),
            _ => None,
        })
        .collect()
}
