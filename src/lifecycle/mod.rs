//! Lifecycle Controller
//!
//! The outermost loop:
//! - Reads persisted state and picks panic or scan polling
//! - Runs one decision pipeline and merges its result back
//! - Persists only when capital or positions changed
//! - Survives errors and panics with a fixed recovery wait
//! - Stops between cycles on interrupt, with one final notification

use anyhow::Result;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::agent::{DecisionPipeline, PipelineInput, PipelineOutcome};
use crate::config::{AppConfig, LifecycleConfig};
use crate::state::{PersistedState, StateStore};
use crate::telemetry::{metrics, Alert, Notifier};
use crate::utils::helpers::format_usd;
use crate::utils::types::{DecisionTag, Directive};

/// Polling cadence derived from open exposure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollingMode {
    /// Open positions: short interval, manage them
    Panic,
    /// Flat: long interval, look for an entry
    Scan,
}

impl PollingMode {
    pub fn select(state: &PersistedState) -> Self {
        if state.has_positions() {
            PollingMode::Panic
        } else {
            PollingMode::Scan
        }
    }

    pub fn directive(&self) -> Directive {
        match self {
            PollingMode::Panic => Directive::ManagePosition,
            PollingMode::Scan => Directive::SeekEntry,
        }
    }

    pub fn interval(&self, config: &LifecycleConfig) -> Duration {
        match self {
            PollingMode::Panic => config.panic_interval(),
            PollingMode::Scan => config.scan_interval(),
        }
    }
}

impl fmt::Display for PollingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollingMode::Panic => write!(f, "PANIC"),
            PollingMode::Scan => write!(f, "SCAN"),
        }
    }
}

/// Interval the controller sleeps after a cycle over `state`
pub fn select_interval(state: &PersistedState, config: &LifecycleConfig) -> Duration {
    PollingMode::select(state).interval(config)
}

/// What one cycle did
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub mode: PollingMode,
    pub interval: Duration,
    pub outcome: PipelineOutcome,
    pub state: PersistedState,
    pub persisted: bool,
    pub position_closed: bool,
}

pub struct LifecycleController {
    config: Arc<AppConfig>,
    store: StateStore,
    pipeline: Arc<dyn DecisionPipeline>,
    notifier: Arc<dyn Notifier>,
}

impl LifecycleController {
    pub fn new(
        config: Arc<AppConfig>,
        store: StateStore,
        pipeline: Arc<dyn DecisionPipeline>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            store,
            pipeline,
            notifier,
        }
    }

    /// One read, decide, merge, persist pass
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let state = self.store.load().await;
        let mode = PollingMode::select(&state);
        let interval = mode.interval(&self.config.lifecycle);
        metrics::record_polling_interval(interval.as_secs());

        info!(
            "{} mode | capital {} | {} open positions | directive {}",
            mode,
            format_usd(state.capital),
            state.positions.len(),
            mode.directive()
        );

        let outcome = self
            .pipeline
            .run(PipelineInput {
                capital: state.capital,
                directive: mode.directive(),
                positions: state.positions.clone(),
            })
            .await;

        let merged = merge_outcome(&state, &outcome);
        let position_closed = merged.positions.len() < state.positions.len();
        let persisted = merged != state;
        if persisted {
            self.store.save(&merged).await?;
        }

        if outcome.is_notable() || position_closed {
            self.notifier.send_alert(cycle_alert(mode, &outcome)).await;
        }

        metrics::record_cycle();
        metrics::record_capital(merged.capital);

        Ok(CycleReport {
            mode,
            interval,
            outcome,
            state: merged,
            persisted,
            position_closed,
        })
    }

    /// Loop until `shutdown` turns true. Interrupts are honoured between
    /// cycles only; a running cycle always completes.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!("Lifecycle controller starting");
        self.notifier
            .send_alert(Alert::info("Agent online", "Dynamic polling lifecycle started"))
            .await;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let sleep_for = match AssertUnwindSafe(self.run_cycle()).catch_unwind().await {
                Ok(Ok(report)) => report.interval,
                Ok(Err(e)) => {
                    self.report_failure(Alert::error("Critical error", format!("{:#}", e)))
                        .await;
                    self.config.lifecycle.recovery_interval()
                }
                Err(panic) => {
                    let message = format!("panic: {}", panic_message(panic.as_ref()));
                    self.report_failure(Alert::critical("Critical error", message)).await;
                    self.config.lifecycle.recovery_interval()
                }
            };

            if *shutdown.borrow() {
                break;
            }

            info!("Sleeping {}s", sleep_for.as_secs());
            let interrupted = tokio::select! {
                _ = tokio::time::sleep(sleep_for) => false,
                _ = shutdown.changed() => true,
            };
            if interrupted {
                break;
            }
        }

        info!("Lifecycle controller stopping");
        self.notifier
            .send_alert(Alert::warning("Agent offline", "Stopped manually"))
            .await;
        Ok(())
    }

    async fn report_failure(&self, alert: Alert) {
        error!("Cycle failed: {}", alert.message);
        metrics::record_error();
        self.notifier.send_alert(alert).await;
        warn!(
            "Retrying in {}s",
            self.config.lifecycle.recovery_interval().as_secs()
        );
    }
}

/// Apply pipeline updates to the persisted state. A negative or non-finite
/// capital is ignored.
fn merge_outcome(state: &PersistedState, outcome: &PipelineOutcome) -> PersistedState {
    let mut merged = state.clone();

    let capital = outcome.record.capital;
    if capital.is_finite() && capital >= 0.0 {
        merged.capital = capital;
    } else {
        warn!("Ignoring invalid capital {} from pipeline", capital);
    }
    if let Some(positions) = &outcome.positions {
        merged.positions = positions.clone();
    }
    merged
}

fn cycle_alert(mode: PollingMode, outcome: &PipelineOutcome) -> Alert {
    let title = format!("{} mode: {}", mode, outcome.final_tag());
    if outcome.final_tag() == DecisionTag::Abort {
        Alert::warning(title, outcome.record.message.clone())
    } else {
        Alert::info(title, outcome.record.message.clone())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
