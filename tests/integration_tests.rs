//! Integration Tests for Pattern Pilot
//!
//! Exercises the complete flow from validation to sizing through the public
//! API, with in-memory exchange, auditor and notifier stand-ins.

use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex};

use pattern_pilot::agent::DecisionPipeline;
use pattern_pilot::audit::{AuditReport, SafetyAuditor};
use pattern_pilot::config::AppConfig;
use pattern_pilot::exchange::ExchangeClient;
use pattern_pilot::telemetry::{Alert, Notifier};
use pattern_pilot::utils::types::{DecisionTag, Directive, PriceBar};
use pattern_pilot::{
    LifecycleController, PipelineInput, StateStore, StrategyDescriptor, StrategyStore,
    TradingAgent,
};

struct FakeExchange {
    price: f64,
    balance: f64,
    candles: Vec<PriceBar>,
}

#[async_trait]
impl ExchangeClient for FakeExchange {
    async fn get_price(&self, _symbol: &str) -> f64 {
        self.price
    }

    async fn get_balance(&self) -> f64 {
        self.balance
    }

    async fn get_candles(&self, _symbol: &str, _timeframe: &str, limit: usize) -> Vec<PriceBar> {
        let skip = self.candles.len().saturating_sub(limit);
        self.candles[skip..].to_vec()
    }
}

struct FakeAuditor {
    safe: bool,
}

#[async_trait]
impl SafetyAuditor for FakeAuditor {
    async fn audit(&self, _token_address: &str) -> AuditReport {
        if self.safe {
            AuditReport::safe("approve simulation succeeded")
        } else {
            AuditReport::unsafe_because("approve reverted")
        }
    }
}

#[derive(Default)]
struct RecordingNotifier {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingNotifier {
    fn titles(&self) -> Vec<String> {
        self.alerts
            .lock()
            .unwrap()
            .iter()
            .map(|a| a.title.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_alert(&self, alert: Alert) {
        self.alerts.lock().unwrap().push(alert);
    }
}

fn config_in(dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.storage.state_path = dir.join("state.json");
    config.storage.candidates_path = dir.join("candidates.json");
    config.storage.approved_path = dir.join("approved.json");
    config
}

/// Alternating hammer and rally bars climbing one point per pair
fn hammer_bars(pairs: usize) -> Vec<PriceBar> {
    (0..pairs)
        .flat_map(|k| {
            let p = 100.0 + k as f64;
            let t = (k * 2) as i64 * 900_000;
            [
                PriceBar::new(t, p, p + 0.2, p - 2.0, p + 0.1, 10.0),
                PriceBar::new(t + 900_000, p + 0.1, p + 1.1, p + 0.1, p + 1.0, 10.0),
            ]
        })
        .collect()
}

async fn approve(config: &AppConfig, name: &str, tag: &str, score: f64) {
    StrategyStore::new(&config.storage.candidates_path, &config.storage.approved_path)
        .replace_approved(&[StrategyDescriptor::new(name, tag).promoted(score)])
        .await
        .unwrap();
}

fn agent(config: Arc<AppConfig>, exchange: FakeExchange, safe: bool) -> TradingAgent {
    TradingAgent::new(config, Arc::new(exchange), Arc::new(FakeAuditor { safe }))
}

fn flat_exchange(price: f64) -> FakeExchange {
    FakeExchange {
        price,
        balance: 0.0,
        candles: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_parses_partial_yaml() {
        let yaml = r#"
trading:
  symbol: "ETH/USDT"
  selection: best_score

lifecycle:
  panic_interval_secs: 5

risk:
  max_fraction: 0.1
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.trading.symbol, "ETH/USDT");
        assert_eq!(config.lifecycle.panic_interval_secs, 5);
        assert_eq!(config.lifecycle.scan_interval_secs, 900);
        assert_eq!(config.risk.max_fraction, 0.1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bundled_config_matches_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config.yaml");
        let config = AppConfig::load(&path).unwrap();
        let defaults = AppConfig::default();
        assert_eq!(config.trading.symbol, defaults.trading.symbol);
        assert_eq!(config.lifecycle.scan_interval_secs, defaults.lifecycle.scan_interval_secs);
        assert_eq!(config.risk.win_probability, defaults.risk.win_probability);
        assert_eq!(config.validation.promotion_threshold, defaults.validation.promotion_threshold);
    }

    #[test]
    fn test_kelly_sizing_by_phase() {
        let config = AppConfig::default();
        let risk = pattern_pilot::RiskManager::new(config.risk.clone());

        // aggressive phase hits the 20% ceiling
        assert!((risk.bet_size(500.0) - 100.0).abs() < 1e-9);
        assert!((risk.bet_size(15.0) - 3.0).abs() < 1e-9);
        // moderate: 0.4 * 0.3
        assert!((risk.bet_size(50_000.0) - 6_000.0).abs() < 1e-6);
        // preservation: 0.4 * 0.1
        assert!((risk.bet_size(200_000.0) - 8_000.0).abs() < 1e-6);
        // no edge
        assert_eq!(risk.size_with(500.0, 0.4, 1.0).bet_size, 0.0);
    }

    #[test]
    fn test_interval_follows_exposure() {
        use pattern_pilot::lifecycle::select_interval;
        use pattern_pilot::PersistedState;
        use std::time::Duration;

        let lifecycle = AppConfig::default().lifecycle;
        let flat = PersistedState::with_capital(15.0);
        let mut exposed = flat.clone();
        exposed.positions.push(serde_json::json!({"symbol": "SOL/USDT"}));

        assert_eq!(select_interval(&flat, &lifecycle), Duration::from_secs(900));
        assert_eq!(select_interval(&exposed, &lifecycle), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_safe_token_is_sized() {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(config_in(dir.path()));
        approve(&config, "NISON_HAMMER", "REBOUND", 3.1).await;

        let outcome = agent(config, flat_exchange(142.5), true)
            .run(PipelineInput {
                capital: 500.0,
                directive: Directive::SeekEntry,
                positions: Vec::new(),
            })
            .await;

        assert_eq!(outcome.final_tag(), DecisionTag::Done);
        assert_eq!(outcome.record.strategy.as_deref(), Some("NISON_HAMMER"));
        assert_eq!(outcome.record.is_safe, Some(true));
        assert_eq!(outcome.record.bet_size, Some(100.0));
        assert_eq!(outcome.record.capital, 500.0);
        assert!(outcome.is_notable());
        assert_eq!(outcome.transitions.len(), 3);
        assert!(outcome.positions.is_none());
    }

    #[tokio::test]
    async fn test_unsafe_token_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(config_in(dir.path()));
        approve(&config, "NISON_HAMMER", "REBOUND", 3.1).await;

        let outcome = agent(config, flat_exchange(142.5), false)
            .run(PipelineInput {
                capital: 500.0,
                directive: Directive::SeekEntry,
                positions: Vec::new(),
            })
            .await;

        assert_eq!(outcome.final_tag(), DecisionTag::Abort);
        assert_eq!(outcome.record.is_safe, Some(false));
        assert_eq!(outcome.record.bet_size, None);
        assert_eq!(outcome.record.capital, 500.0);
    }

    #[tokio::test]
    async fn test_unreachable_market_aborts_before_audit() {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(config_in(dir.path()));
        approve(&config, "NISON_HAMMER", "REBOUND", 3.1).await;

        let outcome = agent(config, flat_exchange(0.0), true)
            .run(PipelineInput {
                capital: 15.0,
                directive: Directive::SeekEntry,
                positions: Vec::new(),
            })
            .await;

        assert_eq!(outcome.final_tag(), DecisionTag::Abort);
        assert!(!outcome.reached_audit());
        assert!(outcome.record.message.contains("Market unreachable"));
    }
}

#[cfg(test)]
mod simulation_tests {
    use super::*;
    use pattern_pilot::{Laboratory, PersistedState, PollingMode};
    use tokio::sync::watch;

    #[tokio::test]
    async fn test_research_then_trade_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.trading.sync_balance = true;
        let config = Arc::new(config);

        let exchange = Arc::new(FakeExchange {
            price: 140.0,
            balance: 250.0,
            candles: hammer_bars(20),
        });

        // research: only the hammer survives walk-forward
        let lab = Laboratory::new(config.clone(), exchange.clone());
        lab.extract().await.unwrap();
        let summary = lab.run().await.unwrap().unwrap();
        assert_eq!(summary.approved, vec!["NISON_HAMMER".to_string()]);

        // trade: one flat cycle with a synced balance
        let agent = Arc::new(TradingAgent::new(
            config.clone(),
            exchange,
            Arc::new(FakeAuditor { safe: true }),
        ));
        let notifier = Arc::new(RecordingNotifier::default());
        let store = StateStore::new(&config.storage.state_path, config.trading.default_capital);
        let controller =
            LifecycleController::new(config.clone(), store.clone(), agent, notifier.clone());

        let report = controller.run_cycle().await.unwrap();
        assert_eq!(report.mode, PollingMode::Scan);
        assert_eq!(report.interval.as_secs(), 900);
        assert_eq!(report.outcome.final_tag(), DecisionTag::Done);
        assert_eq!(report.outcome.record.bet_size, Some(50.0));
        assert!(report.outcome.record.stop_price.is_some());
        assert!(report.persisted);

        assert_eq!(store.load().await, PersistedState::with_capital(250.0));
        assert_eq!(notifier.titles(), vec!["SCAN mode: DONE".to_string()]);
    }

    #[tokio::test]
    async fn test_unchanged_state_is_not_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(config_in(dir.path()));

        // nothing approved: DONE without touching capital
        let agent = Arc::new(agent(config.clone(), flat_exchange(140.0), true));
        let notifier = Arc::new(RecordingNotifier::default());
        let store = StateStore::new(&config.storage.state_path, config.trading.default_capital);
        let controller = LifecycleController::new(config.clone(), store, agent, notifier.clone());

        let report = controller.run_cycle().await.unwrap();
        assert_eq!(report.outcome.final_tag(), DecisionTag::Done);
        assert!(!report.persisted);
        assert!(!config.storage.state_path.exists());
        assert!(notifier.titles().is_empty());
    }

    #[tokio::test]
    async fn test_open_position_switches_to_panic_mode() {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(config_in(dir.path()));
        let store = StateStore::new(&config.storage.state_path, config.trading.default_capital);
        let mut state = PersistedState::with_capital(20.0);
        state
            .positions
            .push(serde_json::json!({"symbol": "SOL/USDT", "entry": 140.0}));
        store.save(&state).await.unwrap();

        let agent = Arc::new(agent(config.clone(), flat_exchange(140.0), true));
        let controller = LifecycleController::new(
            config.clone(),
            store.clone(),
            agent,
            Arc::new(RecordingNotifier::default()),
        );

        let report = controller.run_cycle().await.unwrap();
        assert_eq!(report.mode, PollingMode::Panic);
        assert_eq!(report.interval.as_secs(), 10);
        assert_eq!(report.outcome.record.directive, Directive::ManagePosition);
        // the pipeline never touches positions
        assert_eq!(store.load().await, state);
    }

    #[tokio::test]
    async fn test_shutdown_before_first_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(config_in(dir.path()));
        let agent = Arc::new(agent(config.clone(), flat_exchange(140.0), true));
        let notifier = Arc::new(RecordingNotifier::default());
        let store = StateStore::new(&config.storage.state_path, config.trading.default_capital);
        let controller = LifecycleController::new(config, store, agent, notifier.clone());

        let (_tx, rx) = watch::channel(true);
        controller.run(rx).await.unwrap();

        assert_eq!(
            notifier.titles(),
            vec!["Agent online".to_string(), "Agent offline".to_string()]
        );
    }
}
