//! Pattern Pilot
//!
//! Autonomous small-capital trading agent that:
//! - Polls fast while exposed and slowly while flat
//! - Trades only strategies that survived walk-forward validation
//! - Audits the token before committing capital
//! - Sizes bets with capital-phased fractional Kelly

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use pattern_pilot::agent::TradingAgent;
use pattern_pilot::audit::EvmAuditor;
use pattern_pilot::config::AppConfig;
use pattern_pilot::exchange::BitgetClient;
use pattern_pilot::lab::Laboratory;
use pattern_pilot::lifecycle::LifecycleController;
use pattern_pilot::state::StateStore;
use pattern_pilot::telemetry::{init_logging, init_metrics, AlertManager};

/// Pattern Pilot - validated patterns, audited tokens, Kelly-sized bets
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Override log level
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Run the polling lifecycle until interrupted (default)
    Run,
    /// Run a single cycle and exit
    Once,
    /// Walk-forward the candidate strategies and rewrite the approved list
    Validate,
    /// Write the built-in pattern catalogue as the candidate list
    Extract,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_found = args.config.exists();
    let mut config = if config_found {
        AppConfig::load(&args.config)?
    } else {
        AppConfig::default()
    };
    if let Some(level) = args.log_level {
        config.telemetry.log_level = level;
    }

    // Held for the lifetime of the process so buffered file logs are flushed
    let _log_guard = init_logging(&config.telemetry)?;

    info!("Starting Pattern Pilot v{}", env!("CARGO_PKG_VERSION"));
    if !config_found {
        warn!("Config file {:?} not found, using defaults", args.config);
    }
    info!(
        "Symbol: {} ({}) | selection: {:?}",
        config.trading.symbol, config.trading.timeframe, config.trading.selection
    );

    if config.telemetry.enable_metrics {
        init_metrics(config.telemetry.metrics_port)?;
    }

    let config = Arc::new(config);
    let exchange = Arc::new(BitgetClient::new(&config.exchange)?);

    match args.command.unwrap_or(Command::Run) {
        Command::Extract => {
            let lab = Laboratory::new(config.clone(), exchange);
            let catalogue = lab.extract().await?;
            info!(
                "Wrote {} candidates to {:?}",
                catalogue.len(),
                config.storage.candidates_path
            );
        }
        Command::Validate => {
            let lab = Laboratory::new(config.clone(), exchange);
            match lab.run().await? {
                Some(summary) => info!(
                    "Validation pass over {} bars: {}/{} approved {:?}",
                    summary.history_bars,
                    summary.approved.len(),
                    summary.tested,
                    summary.approved
                ),
                None => warn!("Validation skipped, approved list unchanged"),
            }
        }
        command @ (Command::Run | Command::Once) => {
            let auditor = Arc::new(EvmAuditor::new(&config.audit)?);
            let agent = Arc::new(TradingAgent::new(config.clone(), exchange, auditor));
            let notifier = Arc::new(AlertManager::new(&config.telemetry));
            let store = StateStore::new(
                config.storage.state_path.clone(),
                config.trading.default_capital,
            );
            let controller = LifecycleController::new(config.clone(), store, agent, notifier);

            if command == Command::Once {
                let report = controller.run_cycle().await?;
                info!(
                    "{} -> {} (next poll in {}s, state {})",
                    report.outcome.final_tag(),
                    report.outcome.record.message,
                    report.interval.as_secs(),
                    if report.persisted { "saved" } else { "unchanged" }
                );
            } else {
                let (shutdown_tx, shutdown_rx) = watch::channel(false);
                tokio::spawn(async move {
                    match signal::ctrl_c().await {
                        Ok(()) => {
                            info!("Shutdown signal received, finishing current cycle...");
                            let _ = shutdown_tx.send(true);
                        }
                        Err(err) => {
                            error!("Error listening for shutdown signal: {}", err);
                            // Keep the sender alive so the loop is not stopped
                            std::future::pending::<()>().await;
                        }
                    }
                });

                controller.run(shutdown_rx).await?;
            }
        }
    }

    info!("Pattern Pilot stopped");
    Ok(())
}
