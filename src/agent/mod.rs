//! Agent Module
//!
//! Runs one decision pipeline per lifecycle cycle:
//! - SCAN: pick an approved strategy and read the market
//! - AUDIT: check the token with the safety auditor
//! - SIZE: fractional-Kelly bet and volatility stop
//!
//! Stages return partial record updates; the decision state machine validates
//! every move and keeps the transition history.

pub mod risk_manager;
pub mod state_machine;

pub use risk_manager::{RiskManager, RiskPhase, SizingDecision};
pub use state_machine::{
    next_stage, DecisionRecord, DecisionStateMachine, RecordUpdate, Stage, StateTransition,
};

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::audit::SafetyAuditor;
use crate::config::AppConfig;
use crate::engines::indicators;
use crate::exchange::ExchangeClient;
use crate::strategy::{selector_for, StrategySelector, StrategyStore};
use crate::telemetry::metrics;
use crate::utils::helpers::format_price;
use crate::utils::types::{DecisionTag, Directive, PositionRecord, PriceSeries};

/// What the lifecycle hands to one pipeline run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineInput {
    pub capital: f64,
    pub directive: Directive,
    pub positions: Vec<PositionRecord>,
}

/// Result of one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub record: DecisionRecord,
    pub transitions: Vec<StateTransition>,
    /// Replacement position list; `None` leaves the persisted list untouched
    pub positions: Option<Vec<PositionRecord>>,
}

impl PipelineOutcome {
    pub fn final_tag(&self) -> DecisionTag {
        self.record.decision
    }

    pub fn reached_audit(&self) -> bool {
        self.record.is_safe.is_some()
    }

    /// SIZE ran and produced a non-zero bet
    pub fn sized(&self) -> bool {
        self.record.bet_size.map_or(false, |b| b > 0.0)
    }

    /// Whether the outcome deserves an external notification
    pub fn is_notable(&self) -> bool {
        self.final_tag() == DecisionTag::Abort || self.reached_audit() || self.sized()
    }
}

/// One decision pipeline run per lifecycle cycle
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DecisionPipeline: Send + Sync {
    /// Run to a terminal decision. Collaborator failures surface as ABORT or
    /// DONE, never as an error.
    async fn run(&self, input: PipelineInput) -> PipelineOutcome;
}

/// Trading agent: SCAN, AUDIT and SIZE over shared collaborators
pub struct TradingAgent {
    /// Configuration
    config: Arc<AppConfig>,
    /// Market access
    exchange: Arc<dyn ExchangeClient>,
    /// Token safety checks
    auditor: Arc<dyn SafetyAuditor>,
    /// Approved strategy list
    strategies: StrategyStore,
    /// SCAN selection policy
    selector: Box<dyn StrategySelector>,
    /// Bet sizing
    risk_manager: RiskManager,
}

impl TradingAgent {
    pub fn new(
        config: Arc<AppConfig>,
        exchange: Arc<dyn ExchangeClient>,
        auditor: Arc<dyn SafetyAuditor>,
    ) -> Self {
        let strategies = StrategyStore::new(
            config.storage.candidates_path.clone(),
            config.storage.approved_path.clone(),
        );
        let selector = selector_for(config.trading.selection);
        let risk_manager = RiskManager::new(config.risk.clone());

        Self {
            config,
            exchange,
            auditor,
            strategies,
            selector,
            risk_manager,
        }
    }

    /// Replace the selection policy
    pub fn with_selector(mut self, selector: Box<dyn StrategySelector>) -> Self {
        self.selector = selector;
        self
    }

    async fn scan(&self, record: &DecisionRecord) -> RecordUpdate {
        let approved = self.strategies.load_approved().await;
        if approved.is_empty() {
            return RecordUpdate::decision(DecisionTag::Done, "No approved strategies yet, nothing to do");
        }

        let Some(strategy) = self.selector.select(&approved) else {
            return RecordUpdate::decision(DecisionTag::Done, "No approved strategy selected, nothing to do");
        };
        info!(
            "Scan: {} selected {} ({}) from {} approved",
            self.selector.name(),
            strategy.name,
            strategy.pattern_type,
            approved.len()
        );

        let price = self.exchange.get_price(&record.symbol).await;
        if price.is_nan() || price <= 0.0 {
            return RecordUpdate::decision(
                DecisionTag::Abort,
                format!("Market unreachable: no price for {}", record.symbol),
            );
        }

        let volatility = self.estimate_volatility(&record.symbol).await;

        RecordUpdate {
            strategy: Some(strategy.name.clone()),
            price: Some(price),
            volatility,
            decision: Some(DecisionTag::Audit),
            message: Some(format!(
                "Strategy {} selected for {} at {}",
                strategy.name,
                record.symbol,
                format_price(price)
            )),
            ..RecordUpdate::default()
        }
    }

    /// Latest ATR over recent candles; `None` when history is unavailable
    async fn estimate_volatility(&self, symbol: &str) -> Option<f64> {
        let lookback = self.config.trading.volatility_lookback;
        if lookback == 0 {
            return None;
        }
        let candles = self
            .exchange
            .get_candles(symbol, &self.config.trading.timeframe, lookback)
            .await;
        let series = PriceSeries::from_unsorted(candles);
        let atr = indicators::average_true_range(series.bars(), self.config.signal.volatility_window);
        let volatility = indicators::last_value(&atr);
        if volatility.is_none() {
            debug!("Not enough candles for volatility ({} bars)", series.len());
        }
        volatility
    }

    async fn audit(&self, record: &DecisionRecord) -> RecordUpdate {
        let token = &self.config.trading.token_address;
        let report = self.auditor.audit(token).await;

        if report.is_safe {
            info!("Audit passed for {}: {}", token, report.reason);
            RecordUpdate {
                is_safe: Some(true),
                ..RecordUpdate::decision(
                    DecisionTag::Size,
                    format!("Token {} passed audit: {}", token, report.reason),
                )
            }
        } else {
            warn!("Audit rejected {} for {}: {}", token, record.symbol, report.reason);
            RecordUpdate {
                is_safe: Some(false),
                ..RecordUpdate::decision(
                    DecisionTag::Abort,
                    format!("Audit rejected {}: {}", token, report.reason),
                )
            }
        }
    }

    async fn size(&self, record: &DecisionRecord) -> RecordUpdate {
        let mut capital = record.capital;
        if self.config.trading.sync_balance {
            let balance = self.exchange.get_balance().await;
            if balance > 0.0 {
                debug!("Capital synced from exchange: {:.2} -> {:.2}", capital, balance);
                capital = balance;
            }
        }

        let sizing = self.risk_manager.size(capital);
        let stop_price = record
            .volatility
            .filter(|_| sizing.is_trade())
            .map(|v| self.risk_manager.stop_price(record.price, v));

        let message = if sizing.is_trade() {
            let mut message = format!(
                "Order sized: {:.2} of {:.2} capital ({}, fraction {:.4}) on {} at {}",
                sizing.bet_size,
                capital,
                sizing.phase,
                sizing.fraction,
                record.strategy.as_deref().unwrap_or("-"),
                format_price(record.price)
            );
            if let Some(stop) = stop_price {
                message.push_str(&format!(", stop {}", format_price(stop)));
            }
            message
        } else {
            format!("No edge (Kelly {:.4}), no trade", sizing.pure_kelly)
        };

        RecordUpdate {
            capital: Some(capital),
            bet_size: Some(sizing.bet_size),
            stop_price,
            ..RecordUpdate::decision(DecisionTag::Done, message)
        }
    }
}

#[async_trait]
impl DecisionPipeline for TradingAgent {
    async fn run(&self, input: PipelineInput) -> PipelineOutcome {
        let mut record = DecisionRecord::new(
            input.capital,
            self.config.trading.symbol.clone(),
            input.directive,
        );
        let mut state_machine = DecisionStateMachine::new();

        info!(
            "Pipeline start: {} | capital {:.2} | {} open positions",
            input.directive,
            input.capital,
            input.positions.len()
        );

        while let Some(stage) = next_stage(record.decision) {
            debug!("Running stage {}", stage);
            let update = match stage {
                Stage::Scan => self.scan(&record).await,
                Stage::Audit => self.audit(&record).await,
                Stage::Size => self.size(&record).await,
            };

            let Some(target) = update.decision else {
                warn!("Stage {} returned no decision, stopping", stage);
                break;
            };
            if !state_machine.transition_to_with_reason(target, update.message.clone()) {
                break;
            }
            record.apply(update);
        }

        metrics::record_decision(record.decision);
        if let Some(bet) = record.bet_size.filter(|b| *b > 0.0) {
            metrics::record_bet_size(bet);
        }
        info!("Pipeline result: {} -> {}", record.decision, record.message);

        PipelineOutcome {
            record,
            transitions: state_machine.into_history(),
            positions: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditReport, MockSafetyAuditor};
    use crate::exchange::MockExchangeClient;
    use crate::strategy::{BestScore, StrategyDescriptor};
    use crate::utils::types::PriceBar;

    struct Fixture {
        _dir: tempfile::TempDir,
        config: Arc<AppConfig>,
    }

    async fn fixture(approved: &[StrategyDescriptor]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.storage.candidates_path = dir.path().join("candidates.json");
        config.storage.approved_path = dir.path().join("approved.json");
        if !approved.is_empty() {
            StrategyStore::new(&config.storage.candidates_path, &config.storage.approved_path)
                .replace_approved(approved)
                .await
                .unwrap();
        }
        Fixture { _dir: dir, config: Arc::new(config) }
    }

    fn approved() -> Vec<StrategyDescriptor> {
        vec![
            StrategyDescriptor::new("NISON_HAMMER", "REBOUND").promoted(2.4),
            StrategyDescriptor::new("VOLMAN_BLOCK_BREAK", "BREAKOUT").promoted(3.1),
        ]
    }

    fn input(capital: f64) -> PipelineInput {
        PipelineInput {
            capital,
            directive: Directive::SeekEntry,
            positions: Vec::new(),
        }
    }

    fn exchange(price: f64) -> MockExchangeClient {
        let mut exchange = MockExchangeClient::new();
        exchange.expect_get_price().returning(move |_| price);
        exchange.expect_get_candles().returning(|_, _, _| Vec::new());
        exchange.expect_get_balance().returning(|| 0.0);
        exchange
    }

    fn auditor(is_safe: bool) -> MockSafetyAuditor {
        let mut auditor = MockSafetyAuditor::new();
        auditor.expect_audit().returning(move |_| AuditReport {
            is_safe,
            reason: if is_safe { "clean".into() } else { "honeypot".into() },
        });
        auditor
    }

    #[tokio::test]
    async fn test_unsafe_audit_aborts_with_capital_unchanged() {
        let fx = fixture(&approved()).await;
        let agent = TradingAgent::new(fx.config.clone(), Arc::new(exchange(150.0)), Arc::new(auditor(false)));

        let outcome = agent.run(input(500.0)).await;
        assert_eq!(outcome.final_tag(), DecisionTag::Abort);
        assert_eq!(outcome.record.capital, 500.0);
        assert_eq!(outcome.record.is_safe, Some(false));
        assert!(outcome.record.bet_size.is_none());
        assert!(outcome.record.message.contains("honeypot"));
        assert!(outcome.is_notable());
    }

    #[tokio::test]
    async fn test_safe_audit_sizes_bet() {
        let fx = fixture(&approved()).await;
        let agent = TradingAgent::new(fx.config.clone(), Arc::new(exchange(150.0)), Arc::new(auditor(true)));

        let outcome = agent.run(input(500.0)).await;
        assert_eq!(outcome.final_tag(), DecisionTag::Done);
        assert_eq!(outcome.record.strategy.as_deref(), Some("NISON_HAMMER"));
        assert!((outcome.record.bet_size.unwrap() - 100.0).abs() < 1e-9);
        assert!(outcome.record.message.contains("100.00"));
        assert!(outcome.record.stop_price.is_none());
        assert!(outcome.positions.is_none());

        let tags: Vec<_> = outcome.transitions.iter().map(|t| t.to).collect();
        assert_eq!(tags, vec![DecisionTag::Audit, DecisionTag::Size, DecisionTag::Done]);
    }

    #[tokio::test]
    async fn test_scan_reports_selection_not_a_live_signal() {
        let fx = fixture(&approved()).await;
        let agent = TradingAgent::new(fx.config.clone(), Arc::new(exchange(150.0)), Arc::new(auditor(false)));

        let outcome = agent.run(input(500.0)).await;
        let scan = outcome.transitions[0].reason.as_deref().unwrap();
        assert!(scan.starts_with("Strategy NISON_HAMMER selected for SOL/USDT"));
        assert!(!scan.contains("matched"));
    }

    #[tokio::test]
    async fn test_empty_approved_list_is_done() {
        let fx = fixture(&[]).await;
        let mut exchange = MockExchangeClient::new();
        exchange.expect_get_price().never();
        let mut auditor = MockSafetyAuditor::new();
        auditor.expect_audit().never();
        let agent = TradingAgent::new(fx.config.clone(), Arc::new(exchange), Arc::new(auditor));

        let outcome = agent.run(input(15.0)).await;
        assert_eq!(outcome.final_tag(), DecisionTag::Done);
        assert!(outcome.record.message.contains("nothing to do"));
        assert!(!outcome.is_notable());
    }

    #[tokio::test]
    async fn test_price_sentinel_aborts_before_audit() {
        let fx = fixture(&approved()).await;
        let mut auditor = MockSafetyAuditor::new();
        auditor.expect_audit().never();
        let agent = TradingAgent::new(fx.config.clone(), Arc::new(exchange(0.0)), Arc::new(auditor));

        let outcome = agent.run(input(15.0)).await;
        assert_eq!(outcome.final_tag(), DecisionTag::Abort);
        assert!(outcome.record.message.contains("Market unreachable"));
        assert!(!outcome.reached_audit());
    }

    #[tokio::test]
    async fn test_nan_price_aborts_before_audit() {
        let fx = fixture(&approved()).await;
        let mut auditor = MockSafetyAuditor::new();
        auditor.expect_audit().never();
        let agent = TradingAgent::new(fx.config.clone(), Arc::new(exchange(f64::NAN)), Arc::new(auditor));

        let outcome = agent.run(input(15.0)).await;
        assert_eq!(outcome.final_tag(), DecisionTag::Abort);
        assert!(outcome.record.message.contains("Market unreachable"));
    }

    #[tokio::test]
    async fn test_best_score_selector_and_stop() {
        let fx = fixture(&approved()).await;
        let mut exchange = MockExchangeClient::new();
        exchange.expect_get_price().returning(|_| 100.0);
        exchange.expect_get_candles().returning(|_, _, limit| {
            (0..limit as i64)
                .map(|i| PriceBar::new(i, 100.0, 101.0, 99.0, 100.0, 1.0))
                .collect()
        });
        let agent = TradingAgent::new(fx.config.clone(), Arc::new(exchange), Arc::new(auditor(true)))
            .with_selector(Box::new(BestScore));

        let outcome = agent.run(input(500.0)).await;
        assert_eq!(outcome.record.strategy.as_deref(), Some("VOLMAN_BLOCK_BREAK"));
        assert!((outcome.record.volatility.unwrap() - 2.0).abs() < 1e-9);
        assert!((outcome.record.stop_price.unwrap() - 96.0).abs() < 1e-9);
        assert!(outcome.record.message.contains("stop"));
    }

    #[tokio::test]
    async fn test_balance_sync_replaces_capital() {
        let fx = fixture(&approved()).await;
        let mut config = (*fx.config).clone();
        config.trading.sync_balance = true;
        let mut exchange = MockExchangeClient::new();
        exchange.expect_get_price().returning(|_| 150.0);
        exchange.expect_get_candles().returning(|_, _, _| Vec::new());
        exchange.expect_get_balance().times(1).returning(|| 50_000.0);
        let agent = TradingAgent::new(Arc::new(config), Arc::new(exchange), Arc::new(auditor(true)));

        let outcome = agent.run(input(15.0)).await;
        assert_eq!(outcome.record.capital, 50_000.0);
        assert!((outcome.record.bet_size.unwrap() - 6_000.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_no_edge_is_done_without_trade() {
        let fx = fixture(&approved()).await;
        let mut config = (*fx.config).clone();
        config.risk.win_probability = 0.4;
        config.risk.payoff_ratio = 1.0;
        let agent = TradingAgent::new(Arc::new(config), Arc::new(exchange(150.0)), Arc::new(auditor(true)));

        let outcome = agent.run(input(500.0)).await;
        assert_eq!(outcome.final_tag(), DecisionTag::Done);
        assert_eq!(outcome.record.bet_size, Some(0.0));
        assert!(!outcome.sized());
        assert!(outcome.record.message.contains("no trade"));
    }
}
