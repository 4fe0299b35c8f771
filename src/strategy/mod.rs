//! Strategy Module
//!
//! Strategy descriptors as persisted on disk, the pattern evaluators they map
//! to, the built-in candidate catalogue and the approved-strategy store.

pub mod evaluators;
pub mod library;
pub mod selector;

pub use evaluators::{evaluator_for, PatternEvaluator, PatternKind};
pub use library::{candidate_catalogue, StrategyStore};
pub use selector::{selector_for, BestScore, FirstMatch, StrategySelector};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Status written into the metrics block of promoted strategies
pub const APPROVED_STATUS: &str = "APPROVED";

/// Validation results attached to a promoted strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyMetrics {
    #[serde(rename = "sharpe")]
    pub score: f64,
    #[serde(rename = "estado")]
    pub status: String,
}

/// A candidate or approved trading pattern.
///
/// Field names on disk are fixed by the shared strategy file format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyDescriptor {
    /// Unique identifier
    #[serde(rename = "nombre")]
    pub name: String,
    /// Pattern-type tag, resolved to an evaluator by [`PatternKind::from_tag`]
    #[serde(rename = "tipo")]
    pub pattern_type: String,
    /// Symbolic conditions, e.g. "body_ratio" -> "< 0.15"
    #[serde(rename = "reglas", default)]
    pub rules: BTreeMap<String, serde_json::Value>,
    /// Provenance note
    #[serde(rename = "fuente", default)]
    pub source: String,
    #[serde(rename = "metricas", default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<StrategyMetrics>,
}

impl StrategyDescriptor {
    pub fn new(name: impl Into<String>, pattern_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pattern_type: pattern_type.into(),
            rules: BTreeMap::new(),
            source: String::new(),
            metrics: None,
        }
    }

    pub fn with_rule(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.rules.insert(key.into(), value.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn kind(&self) -> PatternKind {
        PatternKind::from_tag(&self.pattern_type)
    }

    /// Validation score, if the strategy has been through the validator
    pub fn score(&self) -> Option<f64> {
        self.metrics.as_ref().map(|m| m.score)
    }

    /// Copy of this descriptor carrying promotion metrics
    pub fn promoted(&self, score: f64) -> Self {
        Self {
            metrics: Some(StrategyMetrics {
                score,
                status: APPROVED_STATUS.to_string(),
            }),
            ..self.clone()
        }
    }
}
