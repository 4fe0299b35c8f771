//! Pattern evaluators
//!
//! Each pattern-type tag resolves to one [`PatternKind`], and each kind to one
//! evaluator producing per-bar entry flags for a whole series.

use std::fmt;

use crate::config::SignalConfig;
use crate::engines::{SignalEngine, SignalError};
use crate::utils::types::PriceSeries;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternKind {
    /// Compression or paired-indecision breakout near the trend average
    CompressionBreakout,
    /// Bearish bar fully engulfed by the following bullish bar
    BullishEngulfing,
    /// Lower shadow longer than twice the body
    Hammer,
    /// No executable rule set; never fires
    Unsupported,
}

impl PatternKind {
    /// Resolve a pattern-type tag, case-insensitive. Legacy tags are accepted.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_uppercase().as_str() {
            "BREAKOUT" | "RUPTURA" | "COMPRESSION_BREAKOUT" => PatternKind::CompressionBreakout,
            "REVERSION" | "ENGULFING" | "BULLISH_ENGULFING" => PatternKind::BullishEngulfing,
            "REBOUND" | "REBOTE" | "HAMMER" => PatternKind::Hammer,
            _ => PatternKind::Unsupported,
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternKind::CompressionBreakout => write!(f, "compression-breakout"),
            PatternKind::BullishEngulfing => write!(f, "bullish-engulfing"),
            PatternKind::Hammer => write!(f, "hammer"),
            PatternKind::Unsupported => write!(f, "unsupported"),
        }
    }
}

/// Common capability of every pattern: entry flags over a full series
pub trait PatternEvaluator: Send + Sync {
    fn kind(&self) -> PatternKind;

    /// Shortest series the evaluator accepts
    fn min_bars(&self) -> usize;

    /// One flag per bar; `true` means enter long at that bar's close
    fn evaluate(&self, series: &PriceSeries) -> Result<Vec<bool>, SignalError>;
}

pub fn evaluator_for(kind: PatternKind, signal: &SignalConfig) -> Box<dyn PatternEvaluator> {
    match kind {
        PatternKind::CompressionBreakout => {
            Box::new(BreakoutEvaluator::new(SignalEngine::new(signal.clone())))
        }
        PatternKind::BullishEngulfing => Box::new(EngulfingEvaluator),
        PatternKind::Hammer => Box::new(HammerEvaluator),
        PatternKind::Unsupported => Box::new(InertEvaluator),
    }
}

pub struct BreakoutEvaluator {
    engine: SignalEngine,
}

impl BreakoutEvaluator {
    pub fn new(engine: SignalEngine) -> Self {
        Self { engine }
    }
}

impl PatternEvaluator for BreakoutEvaluator {
    fn kind(&self) -> PatternKind {
        PatternKind::CompressionBreakout
    }

    fn min_bars(&self) -> usize {
        self.engine.min_bars()
    }

    fn evaluate(&self, series: &PriceSeries) -> Result<Vec<bool>, SignalError> {
        Ok(self.engine.compute(series)?.entry)
    }
}

pub struct EngulfingEvaluator;

impl PatternEvaluator for EngulfingEvaluator {
    fn kind(&self) -> PatternKind {
        PatternKind::BullishEngulfing
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn evaluate(&self, series: &PriceSeries) -> Result<Vec<bool>, SignalError> {
        check_len(series, self.min_bars())?;
        let bars = series.bars();
        let mut flags = vec![false; bars.len()];
        for i in 1..bars.len() {
            let (prev, cur) = (&bars[i - 1], &bars[i]);
            flags[i] = prev.is_bearish()
                && cur.is_bullish()
                && cur.close > prev.open
                && cur.open < prev.close;
        }
        Ok(flags)
    }
}

pub struct HammerEvaluator;

impl PatternEvaluator for HammerEvaluator {
    fn kind(&self) -> PatternKind {
        PatternKind::Hammer
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn evaluate(&self, series: &PriceSeries) -> Result<Vec<bool>, SignalError> {
        check_len(series, self.min_bars())?;
        Ok(series
            .bars()
            .iter()
            .map(|b| {
                let lower_shadow = b.open.min(b.close) - b.low;
                lower_shadow > b.body() * 2.0
            })
            .collect())
    }
}

pub struct InertEvaluator;

impl PatternEvaluator for InertEvaluator {
    fn kind(&self) -> PatternKind {
        PatternKind::Unsupported
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn evaluate(&self, series: &PriceSeries) -> Result<Vec<bool>, SignalError> {
        check_len(series, self.min_bars())?;
        Ok(vec![false; series.len()])
    }
}

fn check_len(series: &PriceSeries, min_bars: usize) -> Result<(), SignalError> {
    if series.len() < min_bars {
        return Err(SignalError::InsufficientHistory {
            bars: series.len(),
            min_bars,
        });
    }
    Ok(())
}
