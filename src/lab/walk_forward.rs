//! Walk-forward validation
//!
//! Splits a series at its midpoint and requires a strategy to make money in
//! both halves, evaluated independently, before it can be promoted.

use thiserror::Error;
use tracing::{debug, info};

use crate::config::{SignalConfig, ValidationConfig};
use crate::engines::indicators::Column;
use crate::engines::SignalError;
use crate::strategy::{evaluator_for, PatternEvaluator, StrategyDescriptor};
use crate::utils::types::PriceSeries;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("series of {bars} bars is too short to split; each half needs {min_window} bars")]
    InsufficientHistory { bars: usize, min_window: usize },
    #[error("signal evaluation failed: {0}")]
    Signal(#[from] SignalError),
}

/// Outcome of running one strategy over one window
#[derive(Debug, Clone, PartialEq)]
pub struct WindowResult {
    pub bars: usize,
    /// Sum of forward returns over bars where the strategy fired
    pub cumulative_return: f64,
    /// Bars where the strategy fired, including any without a defined return
    pub operations: u32,
    /// Forward return of each fired bar that has one, in bar order
    pub trade_returns: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WalkForwardReport {
    pub strategy: String,
    pub in_sample: WindowResult,
    pub out_of_sample: WindowResult,
    /// Profitable in both windows with enough out-of-sample trades
    pub robust: bool,
    pub score: f64,
    /// Robust and scoring above the promotion threshold
    pub promoted: bool,
}

/// Per-bar return of buying at this close and selling at the next one.
///
/// The next-close column is forward-filled and then differenced, so the first
/// bar of a window has no return (`None`) and the last bar returns 0. A zero
/// close also yields `None`.
pub fn forward_returns(series: &PriceSeries) -> Column {
    let bars = series.bars();
    let n = bars.len();
    let mut returns = vec![None; n];
    for i in 1..n {
        let current = bars[i].close;
        let next = if i + 1 < n { bars[i + 1].close } else { current };
        if current != 0.0 {
            returns[i] = Some(next / current - 1.0);
        }
    }
    returns
}

/// Sharpe-style consistency score: mean over population standard deviation,
/// scaled by the square root of the trade count. 0 for fewer than two trades
/// or zero dispersion.
pub fn quality_score(trade_returns: &[f64]) -> f64 {
    let n = trade_returns.len();
    if n < 2 {
        return 0.0;
    }
    let count = n as f64;
    let mean = trade_returns.iter().sum::<f64>() / count;
    let variance = trade_returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / count;
    let std = variance.sqrt();
    if std == 0.0 || !std.is_finite() {
        return 0.0;
    }
    mean / std * count.sqrt()
}

pub struct WalkForwardValidator {
    signal: SignalConfig,
    min_oos_operations: u32,
    promotion_threshold: f64,
}

impl WalkForwardValidator {
    pub fn new(signal: SignalConfig, validation: &ValidationConfig) -> Self {
        Self {
            signal,
            min_oos_operations: validation.min_oos_operations,
            promotion_threshold: validation.promotion_threshold,
        }
    }

    pub fn validate(
        &self,
        series: &PriceSeries,
        descriptor: &StrategyDescriptor,
    ) -> Result<WalkForwardReport, ValidationError> {
        let evaluator = evaluator_for(descriptor.kind(), &self.signal);
        let mid = series.len() / 2;
        let min_window = evaluator.min_bars().max(2);
        if mid < min_window || series.len() - mid < min_window {
            return Err(ValidationError::InsufficientHistory {
                bars: series.len(),
                min_window,
            });
        }

        let in_sample = run_window(evaluator.as_ref(), &series.slice(0..mid))?;
        let out_of_sample = run_window(evaluator.as_ref(), &series.slice(mid..series.len()))?;

        let robust = in_sample.cumulative_return > 0.0
            && out_of_sample.cumulative_return > 0.0
            && out_of_sample.operations > self.min_oos_operations;

        let all_trades: Vec<f64> = in_sample
            .trade_returns
            .iter()
            .chain(out_of_sample.trade_returns.iter())
            .copied()
            .collect();
        let score = quality_score(&all_trades);
        let promoted = robust && score > self.promotion_threshold;

        debug!(
            "{} ({}): IS {:.4}/{} ops | OOS {:.4}/{} ops | score {:.3}",
            descriptor.name,
            evaluator.kind(),
            in_sample.cumulative_return,
            in_sample.operations,
            out_of_sample.cumulative_return,
            out_of_sample.operations,
            score
        );

        Ok(WalkForwardReport {
            strategy: descriptor.name.clone(),
            in_sample,
            out_of_sample,
            robust,
            score,
            promoted,
        })
    }

    /// Validate every candidate; returns the reports alongside the promoted
    /// descriptors, in candidate order
    pub fn select(
        &self,
        series: &PriceSeries,
        candidates: &[StrategyDescriptor],
    ) -> (Vec<StrategyDescriptor>, Vec<Result<WalkForwardReport, ValidationError>>) {
        let mut approved = Vec::new();
        let mut reports = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let report = self.validate(series, candidate);
            match &report {
                Ok(r) if r.promoted => {
                    info!("APPROVED: {} (score {:.3})", candidate.name, r.score);
                    approved.push(candidate.promoted(r.score));
                }
                Ok(r) => info!(
                    "REJECTED: {} (robust {}, score {:.3})",
                    candidate.name, r.robust, r.score
                ),
                Err(e) => info!("REJECTED: {} ({})", candidate.name, e),
            }
            reports.push(report);
        }

        (approved, reports)
    }
}

fn run_window(evaluator: &dyn PatternEvaluator, window: &PriceSeries) -> Result<WindowResult, SignalError> {
    let flags = evaluator.evaluate(window)?;
    let returns = forward_returns(window);

    let operations = flags.iter().filter(|fired| **fired).count() as u32;
    let trade_returns: Vec<f64> = flags
        .iter()
        .zip(returns.iter())
        .filter_map(|(fired, r)| if *fired { *r } else { None })
        .collect();

    Ok(WindowResult {
        bars: window.len(),
        cumulative_return: trade_returns.iter().sum(),
        operations,
        trade_returns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::types::PriceBar;

    /// Alternating hammer and rally bars climbing one point per pair
    fn hammer_series(pairs: usize) -> PriceSeries {
        let mut bars = Vec::with_capacity(pairs * 2);
        for k in 0..pairs {
            let p = 100.0 + k as f64;
            let t = (k * 2) as i64;
            bars.push(PriceBar::new(t, p, p + 0.2, p - 2.0, p + 0.1, 10.0));
            bars.push(PriceBar::new(t + 1, p + 0.1, p + 1.1, p + 0.1, p + 1.0, 10.0));
        }
        PriceSeries::new(bars).unwrap()
    }

    fn validator() -> WalkForwardValidator {
        WalkForwardValidator::new(SignalConfig::default(), &ValidationConfig::default())
    }

    #[test]
    fn test_forward_returns() {
        let series = PriceSeries::new(vec![
            PriceBar::new(0, 1.0, 1.0, 1.0, 100.0, 1.0),
            PriceBar::new(1, 1.0, 1.0, 1.0, 110.0, 1.0),
            PriceBar::new(2, 1.0, 1.0, 1.0, 99.0, 1.0),
        ])
        .unwrap();
        let r = forward_returns(&series);
        assert_eq!(r[0], None);
        assert!((r[1].unwrap() + 0.1).abs() < 1e-12);
        assert_eq!(r[2], Some(0.0));
    }

    #[test]
    fn test_signal_on_first_bar_counts_without_return() {
        let series = hammer_series(20);
        let report = validator()
            .validate(&series, &StrategyDescriptor::new("NISON_HAMMER", "REBOUND"))
            .unwrap();

        // both windows open on a hammer
        assert_eq!(report.in_sample.operations, 10);
        assert_eq!(report.in_sample.trade_returns.len(), 9);
        let expected: f64 = (1..10)
            .map(|k| {
                let p = 100.0 + k as f64;
                (p + 1.0) / (p + 0.1) - 1.0
            })
            .sum();
        assert!((report.in_sample.cumulative_return - expected).abs() < 1e-12);
    }

    #[test]
    fn test_quality_score_edge_cases() {
        assert_eq!(quality_score(&[]), 0.0);
        assert_eq!(quality_score(&[0.05]), 0.0);
        assert_eq!(quality_score(&[0.01, 0.01, 0.01]), 0.0);
        assert!(quality_score(&[0.01, 0.02, 0.03]) > 0.0);
        assert!(quality_score(&[-0.01, -0.02, -0.03]) < 0.0);
    }

    #[test]
    fn test_never_firing_strategy_is_rejected() {
        let series = hammer_series(30);
        let descriptor = StrategyDescriptor::new("BULKOWSKI_DOUBLE_BOTTOM", "DOUBLE_BOTTOM");
        let report = validator().validate(&series, &descriptor).unwrap();
        assert_eq!(report.out_of_sample.operations, 0);
        assert!(!report.robust);
        assert!(!report.promoted);
    }

    #[test]
    fn test_profitable_hammer_is_promoted() {
        let series = hammer_series(20);
        let descriptor = StrategyDescriptor::new("NISON_HAMMER", "REBOUND");
        let report = validator().validate(&series, &descriptor).unwrap();
        assert_eq!(report.in_sample.bars, 20);
        assert_eq!(report.out_of_sample.operations, 10);
        assert!(report.in_sample.cumulative_return > 0.0);
        assert!(report.robust);
        assert!(report.score > 2.0);
        assert!(report.promoted);
    }

    #[test]
    fn test_too_few_oos_operations_not_robust() {
        // five hammers in the out-of-sample half
        let series = hammer_series(10);
        let report = validator()
            .validate(&series, &StrategyDescriptor::new("NISON_HAMMER", "REBOUND"))
            .unwrap();
        assert_eq!(report.out_of_sample.operations, 5);
        assert!(!report.robust);
    }

    #[test]
    fn test_validation_is_idempotent() {
        let series = hammer_series(25);
        let descriptor = StrategyDescriptor::new("NISON_HAMMER", "REBOUND");
        let v = validator();
        assert_eq!(v.validate(&series, &descriptor), v.validate(&series, &descriptor));
    }

    #[test]
    fn test_short_series_is_an_error() {
        let series = hammer_series(20);
        let descriptor = StrategyDescriptor::new("VOLMAN_BLOCK_BREAK", "BREAKOUT");
        let err = validator().validate(&series, &descriptor).unwrap_err();
        assert_eq!(err, ValidationError::InsufficientHistory { bars: 40, min_window: 25 });
    }

    #[test]
    fn test_select_keeps_only_promoted() {
        let series = hammer_series(20);
        let candidates = vec![
            StrategyDescriptor::new("NISON_HAMMER", "REBOUND"),
            StrategyDescriptor::new("BULKOWSKI_DOUBLE_BOTTOM", "DOUBLE_BOTTOM"),
            StrategyDescriptor::new("VOLMAN_BLOCK_BREAK", "BREAKOUT"),
        ];
        let (approved, reports) = validator().select(&series, &candidates);
        assert_eq!(reports.len(), 3);
        assert!(reports[2].is_err());
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].name, "NISON_HAMMER");
        assert!(approved[0].score().unwrap() > 2.0);
    }
}
