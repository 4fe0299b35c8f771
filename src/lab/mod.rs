//! Laboratory Module
//!
//! Offline strategy research:
//! - Extraction: write the built-in catalogue as the candidate list
//! - Validation: walk-forward every candidate over recent history and rewrite
//!   the approved list with the survivors

pub mod walk_forward;

pub use walk_forward::{
    forward_returns, quality_score, ValidationError, WalkForwardReport, WalkForwardValidator,
    WindowResult,
};

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::exchange::ExchangeClient;
use crate::strategy::{candidate_catalogue, StrategyDescriptor, StrategyStore};
use crate::telemetry::metrics;
use crate::utils::types::PriceSeries;

/// Summary of one validation pass
#[derive(Debug, Clone, PartialEq)]
pub struct LabSummary {
    pub history_bars: usize,
    pub tested: usize,
    pub approved: Vec<String>,
}

pub struct Laboratory {
    config: Arc<AppConfig>,
    exchange: Arc<dyn ExchangeClient>,
    store: StrategyStore,
    validator: Arc<WalkForwardValidator>,
}

impl Laboratory {
    pub fn new(config: Arc<AppConfig>, exchange: Arc<dyn ExchangeClient>) -> Self {
        let store = StrategyStore::new(
            config.storage.candidates_path.clone(),
            config.storage.approved_path.clone(),
        );
        let validator = Arc::new(WalkForwardValidator::new(
            config.signal.clone(),
            &config.validation,
        ));

        Self {
            config,
            exchange,
            store,
            validator,
        }
    }

    /// Write the built-in catalogue to the candidate file
    pub async fn extract(&self) -> Result<Vec<StrategyDescriptor>> {
        let catalogue = candidate_catalogue();
        self.store.save_candidates(&catalogue).await?;
        Ok(catalogue)
    }

    pub async fn fetch_history(&self) -> PriceSeries {
        let trading = &self.config.trading;
        info!(
            "Downloading {} {} bars of {} history",
            self.config.validation.history_limit, trading.timeframe, trading.symbol
        );
        let bars = self
            .exchange
            .get_candles(&trading.symbol, &trading.timeframe, self.config.validation.history_limit)
            .await;
        PriceSeries::from_unsorted(bars)
    }

    /// Run one validation pass. Returns `None` when there was nothing to
    /// validate, in which case the approved list is left untouched.
    pub async fn run(&self) -> Result<Option<LabSummary>> {
        let series = self.fetch_history().await;
        if series.is_empty() {
            warn!("No price history available, skipping validation");
            return Ok(None);
        }

        let candidates = self.store.load_candidates().await;
        if candidates.is_empty() {
            warn!("No candidate strategies, run extraction first");
            return Ok(None);
        }

        info!(
            "Validating {} candidates over {} bars",
            candidates.len(),
            series.len()
        );

        let validator = self.validator.clone();
        let tested = candidates.len();
        let history_bars = series.len();
        let (approved, reports) =
            tokio::task::spawn_blocking(move || validator.select(&series, &candidates))
                .await
                .context("Validation worker failed")?;

        for report in &reports {
            metrics::record_strategy_verdict(matches!(report, Ok(r) if r.promoted));
        }

        self.store.replace_approved(&approved).await?;
        info!("{} of {} strategies approved", approved.len(), tested);

        Ok(Some(LabSummary {
            history_bars,
            tested,
            approved: approved.into_iter().map(|d| d.name).collect(),
        }))
    }
}
