//! Strategy library
//!
//! Built-in candidate catalogue and file-backed storage for the candidate and
//! approved strategy lists. A missing or unreadable list is an empty list.

use anyhow::{Context, Result};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::StrategyDescriptor;

/// Patterns distilled from the classic candlestick and chart-pattern literature
pub fn candidate_catalogue() -> Vec<StrategyDescriptor> {
    vec![
        StrategyDescriptor::new("NISON_BULLISH_ENGULFING", "REVERSION")
            .with_rule("description", "Small bearish bar swallowed by a large bullish bar")
            .with_rule("bar_1", "BEARISH")
            .with_rule("bar_2", "BULLISH")
            .with_rule("body_condition", "BODY_2 > BODY_1")
            .with_rule("close_condition", "CLOSE_2 > OPEN_1")
            .with_rule("prior_trend", "DOWN")
            .with_source("Steve Nison - Japanese Candlestick Charting Techniques"),
        StrategyDescriptor::new("BULKOWSKI_DOUBLE_BOTTOM", "DOUBLE_BOTTOM")
            .with_rule("description", "Price tests the same floor twice and holds")
            .with_rule("min_touches", 2)
            .with_rule("min_separation", "10_BARS")
            .with_rule("floor_difference", "< 2%")
            .with_rule("volume", "RISING_ON_ADVANCE")
            .with_source("Thomas Bulkowski - Encyclopedia of Chart Patterns"),
        StrategyDescriptor::new("NISON_HAMMER", "REBOUND")
            .with_rule("description", "Small body on top of a long lower shadow")
            .with_rule("lower_shadow", "> 2 x BODY")
            .with_rule("upper_shadow", "NEAR_ZERO")
            .with_rule("prior_trend", "DOWN")
            .with_source("Steve Nison - Japanese Candlestick Charting Techniques"),
        StrategyDescriptor::new("VOLMAN_BLOCK_BREAK", "BREAKOUT")
            .with_rule("description", "Tight block or twin small-body bars on the 20 average, then a break of the high")
            .with_rule("block_height", "< 1.5 x ATR")
            .with_rule("block_distance", "< 0.5 x ATR")
            .with_rule("body_ratio", "<= 0.15")
            .with_rule("windows", json!({"trend": 20, "atr": 14, "block": 7}))
            .with_source("Bob Volman - Understanding Price Action"),
    ]
}

/// File-backed candidate and approved strategy lists
#[derive(Debug, Clone)]
pub struct StrategyStore {
    candidates_path: PathBuf,
    approved_path: PathBuf,
}

impl StrategyStore {
    pub fn new(candidates_path: impl Into<PathBuf>, approved_path: impl Into<PathBuf>) -> Self {
        Self {
            candidates_path: candidates_path.into(),
            approved_path: approved_path.into(),
        }
    }

    pub async fn load_candidates(&self) -> Vec<StrategyDescriptor> {
        read_list(&self.candidates_path).await
    }

    pub async fn load_approved(&self) -> Vec<StrategyDescriptor> {
        read_list(&self.approved_path).await
    }

    pub async fn save_candidates(&self, candidates: &[StrategyDescriptor]) -> Result<()> {
        write_list(&self.candidates_path, candidates).await?;
        info!("Saved {} candidate strategies to {:?}", candidates.len(), self.candidates_path);
        Ok(())
    }

    /// Replace the approved list wholesale; nothing from earlier passes survives
    pub async fn replace_approved(&self, approved: &[StrategyDescriptor]) -> Result<()> {
        write_list(&self.approved_path, approved).await?;
        info!("Saved {} approved strategies to {:?}", approved.len(), self.approved_path);
        Ok(())
    }
}

async fn read_list(path: &Path) -> Vec<StrategyDescriptor> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("Strategy file {:?} not found, treating as empty", path);
            return Vec::new();
        }
        Err(e) => {
            warn!("Failed to read strategy file {:?}: {}", path, e);
            return Vec::new();
        }
    };

    match serde_json::from_str(&content) {
        Ok(list) => list,
        Err(e) => {
            warn!("Malformed strategy file {:?}: {}", path, e);
            Vec::new()
        }
    }
}

pub(crate) async fn write_json_atomic(path: &Path, content: String) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }

    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, content)
        .await
        .with_context(|| format!("Failed to write {:?}", tmp))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to move {:?} into place", path))?;
    Ok(())
}

async fn write_list(path: &Path, list: &[StrategyDescriptor]) -> Result<()> {
    let content = serde_json::to_string_pretty(list).context("Failed to serialize strategies")?;
    write_json_atomic(path, content).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::PatternKind;

    fn store(dir: &tempfile::TempDir) -> StrategyStore {
        StrategyStore::new(dir.path().join("candidates.json"), dir.path().join("approved.json"))
    }

    #[test]
    fn test_catalogue_names_are_unique() {
        let catalogue = candidate_catalogue();
        let mut names: Vec<_> = catalogue.iter().map(|d| d.name.clone()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), catalogue.len());
        assert!(catalogue.iter().any(|d| d.kind() == PatternKind::CompressionBreakout));
        assert!(catalogue.iter().all(|d| d.metrics.is_none()));
    }

    #[tokio::test]
    async fn test_missing_files_are_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        assert!(store.load_candidates().await.is_empty());
        assert!(store.load_approved().await.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("approved.json"), "{not json").await.unwrap();
        assert!(store(&dir).load_approved().await.is_empty());
    }

    #[tokio::test]
    async fn test_replace_approved_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let first: Vec<_> = candidate_catalogue().into_iter().map(|d| d.promoted(3.0)).collect();
        store.replace_approved(&first).await.unwrap();
        assert_eq!(store.load_approved().await.len(), first.len());

        let second = vec![first[0].clone()];
        store.replace_approved(&second).await.unwrap();
        assert_eq!(store.load_approved().await, second);
    }

    #[tokio::test]
    async fn test_candidates_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store.save_candidates(&candidate_catalogue()).await.unwrap();
        assert_eq!(store.load_candidates().await, candidate_catalogue());
    }
}
