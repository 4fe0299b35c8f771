//! Pattern Pilot Library
//!
//! Components of an autonomous small-capital trading agent: pattern signals,
//! walk-forward validation, fractional-Kelly sizing and the polling lifecycle.

pub mod agent;
pub mod audit;
pub mod config;
pub mod engines;
pub mod exchange;
pub mod lab;
pub mod lifecycle;
pub mod state;
pub mod strategy;
pub mod telemetry;
pub mod utils;

// Re-export main types
pub use agent::{DecisionPipeline, PipelineInput, PipelineOutcome, RiskManager, TradingAgent};
pub use audit::{AuditReport, EvmAuditor, SafetyAuditor};
pub use config::AppConfig;
pub use engines::{SignalEngine, SignalFrame};
pub use exchange::{BitgetClient, ExchangeClient};
pub use lab::{Laboratory, WalkForwardValidator};
pub use lifecycle::{LifecycleController, PollingMode};
pub use state::{PersistedState, StateStore};
pub use strategy::{StrategyDescriptor, StrategyStore};
