//! Telemetry Module

mod alerts;
mod logging;
pub mod metrics;

pub use self::alerts::{Alert, AlertLevel, AlertManager, Notifier};
#[cfg(test)]
pub use self::alerts::MockNotifier;
pub use self::logging::init_logging;
pub use self::metrics::init_metrics;
