//! Prometheus metrics export

use anyhow::Result;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

use crate::utils::types::DecisionTag;

pub fn init_metrics(port: u16) -> Result<()> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    register_metrics();
    info!("Prometheus metrics server started on {}", addr);
    Ok(())
}

fn register_metrics() {
    // Lifecycle
    describe_counter!("pattern_pilot_cycles_total", "Completed lifecycle cycles");
    describe_counter!("pattern_pilot_errors_total", "Cycles that failed or panicked");
    describe_gauge!("pattern_pilot_polling_interval_secs", "Currently selected polling interval");
    describe_gauge!("pattern_pilot_capital", "Persisted capital");

    // Decisions
    describe_counter!("pattern_pilot_decisions_total", "Terminal decision tags by value");
    describe_gauge!("pattern_pilot_last_decision", "Code of the last terminal decision tag");
    describe_histogram!("pattern_pilot_bet_size", "Sized bets");

    // Laboratory
    describe_counter!("pattern_pilot_strategy_verdicts_total", "Validator verdicts by outcome");
}

pub fn record_cycle() {
    counter!("pattern_pilot_cycles_total").increment(1);
}

pub fn record_error() {
    counter!("pattern_pilot_errors_total").increment(1);
}

pub fn record_decision(tag: DecisionTag) {
    counter!("pattern_pilot_decisions_total", "tag" => tag.to_string()).increment(1);
    gauge!("pattern_pilot_last_decision").set(tag.code() as f64);
}

pub fn record_bet_size(amount: f64) {
    histogram!("pattern_pilot_bet_size").record(amount);
}

pub fn record_capital(capital: f64) {
    gauge!("pattern_pilot_capital").set(capital);
}

pub fn record_polling_interval(secs: u64) {
    gauge!("pattern_pilot_polling_interval_secs").set(secs as f64);
}

pub fn record_strategy_verdict(promoted: bool) {
    let outcome = if promoted { "promoted" } else { "rejected" };
    counter!("pattern_pilot_strategy_verdicts_total", "outcome" => outcome).increment(1);
}
