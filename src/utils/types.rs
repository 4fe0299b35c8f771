//! Common types used throughout the application

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use thiserror::Error;

/// A single OHLCV candle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    /// Open time in milliseconds since epoch
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self { timestamp, open, high, low, close, volume }
    }

    /// Absolute distance between open and close
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    /// High minus low
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SeriesError {
    #[error("timestamps must be strictly increasing: bar {index} has {timestamp} after {previous}")]
    NotIncreasing {
        index: usize,
        timestamp: i64,
        previous: i64,
    },
}

/// Time-ordered, immutable sequence of bars
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceSeries {
    bars: Vec<PriceBar>,
}

impl PriceSeries {
    /// Build a series, rejecting out-of-order or duplicate timestamps
    pub fn new(bars: Vec<PriceBar>) -> Result<Self, SeriesError> {
        for (index, pair) in bars.windows(2).enumerate() {
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(SeriesError::NotIncreasing {
                    index: index + 1,
                    timestamp: pair[1].timestamp,
                    previous: pair[0].timestamp,
                });
            }
        }
        Ok(Self { bars })
    }

    /// Sort by timestamp and drop duplicates, keeping the first occurrence.
    /// Exchange payloads are not guaranteed to be ordered.
    pub fn from_unsorted(mut bars: Vec<PriceBar>) -> Self {
        bars.sort_by_key(|b| b.timestamp);
        bars.dedup_by_key(|b| b.timestamp);
        Self { bars }
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    /// Contiguous sub-series; the range is clamped to the series bounds
    pub fn slice(&self, range: Range<usize>) -> PriceSeries {
        let end = range.end.min(self.bars.len());
        let start = range.start.min(end);
        PriceSeries {
            bars: self.bars[start..end].to_vec(),
        }
    }
}

/// Decision tag carried by the orchestration record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionTag {
    Init,
    Audit,
    Size,
    Abort,
    Done,
}

impl DecisionTag {
    pub fn code(&self) -> u8 {
        match self {
            DecisionTag::Init => 0,
            DecisionTag::Audit => 1,
            DecisionTag::Size => 2,
            DecisionTag::Abort => 3,
            DecisionTag::Done => 4,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DecisionTag::Abort | DecisionTag::Done)
    }
}

impl fmt::Display for DecisionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionTag::Init => write!(f, "INIT"),
            DecisionTag::Audit => write!(f, "AUDIT"),
            DecisionTag::Size => write!(f, "SIZE"),
            DecisionTag::Abort => write!(f, "ABORT"),
            DecisionTag::Done => write!(f, "DONE"),
        }
    }
}

/// What the lifecycle controller asks the pipeline to do this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Directive {
    SeekEntry,
    ManagePosition,
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Directive::SeekEntry => write!(f, "SEEK_ENTRY"),
            Directive::ManagePosition => write!(f, "MANAGE_POSITION"),
        }
    }
}

/// Open position record. The core never inspects it, only passes it through.
pub type PositionRecord = serde_json::Value;
