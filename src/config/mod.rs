//! Configuration module
//!
//! Handles loading and validation of the application configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use url::Url;

use crate::exchange::MAX_CANDLE_PAGE;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub signal: SignalConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::from_yaml(&content)?;
        info!("Configuration loaded from {:?}", path);
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)
            .with_context(|| "Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.trading.symbol.is_empty(), "symbol must not be empty");
        anyhow::ensure!(
            self.trading.default_capital >= 0.0,
            "default_capital must be non-negative"
        );
        anyhow::ensure!(
            self.lifecycle.panic_interval_secs > 0
                && self.lifecycle.panic_interval_secs < self.lifecycle.scan_interval_secs,
            "panic_interval_secs must be positive and shorter than scan_interval_secs"
        );
        anyhow::ensure!(
            self.lifecycle.recovery_interval_secs > 0,
            "recovery_interval_secs must be positive"
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.risk.win_probability),
            "win_probability must be between 0 and 1"
        );
        anyhow::ensure!(self.risk.payoff_ratio > 0.0, "payoff_ratio must be positive");
        anyhow::ensure!(
            self.risk.max_fraction > 0.0 && self.risk.max_fraction <= 1.0,
            "max_fraction must be between 0 and 1"
        );
        anyhow::ensure!(
            self.risk.stop_volatility_multiple > 0.0,
            "stop_volatility_multiple must be positive"
        );
        anyhow::ensure!(
            self.signal.trend_window > 0
                && self.signal.volatility_window > 0
                && self.signal.channel_window > 0,
            "signal windows must be positive"
        );
        anyhow::ensure!(
            (0.0..1.0).contains(&self.signal.indecision_body_ratio),
            "indecision_body_ratio must be in [0, 1)"
        );
        anyhow::ensure!(
            self.validation.history_limit >= 2 * self.signal.min_bars,
            "history_limit must hold two signal windows"
        );
        anyhow::ensure!(
            self.validation.history_limit <= MAX_CANDLE_PAGE,
            "history_limit must not exceed {} candles",
            MAX_CANDLE_PAGE
        );
        anyhow::ensure!(
            self.trading.volatility_lookback <= MAX_CANDLE_PAGE,
            "volatility_lookback must not exceed {} candles",
            MAX_CANDLE_PAGE
        );
        Url::parse(&self.exchange.api_url).context("Invalid exchange api_url")?;
        Url::parse(&self.audit.rpc_url).context("Invalid audit rpc_url")?;
        if let Some(webhook) = self.telemetry.alert_webhook.as_deref().filter(|w| !w.is_empty()) {
            Url::parse(webhook).context("Invalid alert_webhook")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// First entry of the approved list
    FirstMatch,
    /// Highest validation score wins
    BestScore,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    #[serde(default = "default_symbol")]
    pub symbol: String,
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
    /// Starting capital used when no usable state file exists
    #[serde(default = "default_capital")]
    pub default_capital: f64,
    /// Contract checked by the safety auditor before sizing
    #[serde(default = "default_token_address")]
    pub token_address: String,
    #[serde(default = "default_selection")]
    pub selection: SelectionPolicy,
    /// Refresh capital from the exchange balance before sizing
    #[serde(default)]
    pub sync_balance: bool,
    /// Number of recent candles used to estimate volatility during SCAN
    #[serde(default = "default_volatility_lookback")]
    pub volatility_lookback: usize,
}

fn default_symbol() -> String { "SOL/USDT".to_string() }
fn default_timeframe() -> String { "15m".to_string() }
fn default_capital() -> f64 { 15.0 }
fn default_token_address() -> String { "0x4200000000000000000000000000000000000006".to_string() }
fn default_selection() -> SelectionPolicy { SelectionPolicy::FirstMatch }
fn default_volatility_lookback() -> usize { 50 }

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            timeframe: default_timeframe(),
            default_capital: default_capital(),
            token_address: default_token_address(),
            selection: default_selection(),
            sync_balance: false,
            volatility_lookback: default_volatility_lookback(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Poll interval while positions are open
    #[serde(default = "default_panic_interval")]
    pub panic_interval_secs: u64,
    /// Poll interval while flat
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,
    /// Backoff after a failed cycle
    #[serde(default = "default_recovery_interval")]
    pub recovery_interval_secs: u64,
}

fn default_panic_interval() -> u64 { 10 }
fn default_scan_interval() -> u64 { 900 }
fn default_recovery_interval() -> u64 { 60 }

impl LifecycleConfig {
    pub fn panic_interval(&self) -> Duration {
        Duration::from_secs(self.panic_interval_secs)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    pub fn recovery_interval(&self) -> Duration {
        Duration::from_secs(self.recovery_interval_secs)
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            panic_interval_secs: default_panic_interval(),
            scan_interval_secs: default_scan_interval(),
            recovery_interval_secs: default_recovery_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Assumed probability of a winning trade
    #[serde(default = "default_win_probability")]
    pub win_probability: f64,
    /// Average win divided by average loss
    #[serde(default = "default_payoff_ratio")]
    pub payoff_ratio: f64,
    /// Hard ceiling on the fraction of capital per trade
    #[serde(default = "default_max_fraction")]
    pub max_fraction: f64,
    /// Stop distance in units of volatility
    #[serde(default = "default_stop_multiple")]
    pub stop_volatility_multiple: f64,
}

fn default_win_probability() -> f64 { 0.6 }
fn default_payoff_ratio() -> f64 { 2.0 }
fn default_max_fraction() -> f64 { 0.20 }
fn default_stop_multiple() -> f64 { 2.0 }

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            win_probability: default_win_probability(),
            payoff_ratio: default_payoff_ratio(),
            max_fraction: default_max_fraction(),
            stop_volatility_multiple: default_stop_multiple(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    #[serde(default = "default_trend_window")]
    pub trend_window: usize,
    #[serde(default = "default_volatility_window")]
    pub volatility_window: usize,
    #[serde(default = "default_channel_window")]
    pub channel_window: usize,
    /// Body/range ratio at or below which a candle is indecisive
    #[serde(default = "default_indecision_ratio")]
    pub indecision_body_ratio: f64,
    /// Channel height limit in units of volatility
    #[serde(default = "default_compression_multiple")]
    pub compression_multiple: f64,
    /// Max channel-centre distance from the trend in units of volatility
    #[serde(default = "default_proximity_multiple")]
    pub proximity_multiple: f64,
    #[serde(default = "default_min_bars")]
    pub min_bars: usize,
}

fn default_trend_window() -> usize { 20 }
fn default_volatility_window() -> usize { 14 }
fn default_channel_window() -> usize { 7 }
fn default_indecision_ratio() -> f64 { 0.15 }
fn default_compression_multiple() -> f64 { 1.5 }
fn default_proximity_multiple() -> f64 { 0.5 }
fn default_min_bars() -> usize { 25 }

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            trend_window: default_trend_window(),
            volatility_window: default_volatility_window(),
            channel_window: default_channel_window(),
            indecision_body_ratio: default_indecision_ratio(),
            compression_multiple: default_compression_multiple(),
            proximity_multiple: default_proximity_multiple(),
            min_bars: default_min_bars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Bars downloaded for a validation pass
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Out-of-sample operations must exceed this
    #[serde(default = "default_min_oos_operations")]
    pub min_oos_operations: u32,
    /// Quality score must exceed this to be promoted
    #[serde(default = "default_promotion_threshold")]
    pub promotion_threshold: f64,
}

fn default_history_limit() -> usize { 1000 }
fn default_min_oos_operations() -> u32 { 5 }
fn default_promotion_threshold() -> f64 { 2.0 }

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            min_oos_operations: default_min_oos_operations(),
            promotion_threshold: default_promotion_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
    #[serde(default = "default_candidates_path")]
    pub candidates_path: PathBuf,
    #[serde(default = "default_approved_path")]
    pub approved_path: PathBuf,
}

fn default_state_path() -> PathBuf { PathBuf::from("data/state.json") }
fn default_candidates_path() -> PathBuf { PathBuf::from("data/candidate_strategies.json") }
fn default_approved_path() -> PathBuf { PathBuf::from("data/approved_strategies.json") }

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
            candidates_path: default_candidates_path(),
            approved_path: default_approved_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default = "default_exchange_url")]
    pub api_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    /// Environment variable names holding credentials; the values are never stored
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_api_secret_env")]
    pub api_secret_env: String,
    #[serde(default = "default_passphrase_env")]
    pub passphrase_env: String,
}

fn default_exchange_url() -> String { "https://api.bitget.com".to_string() }
fn default_request_timeout() -> u64 { 10000 }
fn default_api_key_env() -> String { "BITGET_API_KEY".to_string() }
fn default_api_secret_env() -> String { "BITGET_SECRET".to_string() }
fn default_passphrase_env() -> String { "BITGET_PASSWORD".to_string() }

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            api_url: default_exchange_url(),
            request_timeout_ms: default_request_timeout(),
            api_key_env: default_api_key_env(),
            api_secret_env: default_api_secret_env(),
            passphrase_env: default_passphrase_env(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    /// Spender used for the approve() simulation
    #[serde(default = "default_router")]
    pub router_address: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_rpc_url() -> String { "https://mainnet.base.org".to_string() }
fn default_router() -> String { "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D".to_string() }

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            router_address: default_router(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
    pub log_file: Option<String>,
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    #[serde(default)]
    pub enable_metrics: bool,
    #[serde(default = "default_true")]
    pub enable_alerts: bool,
    /// Discord-compatible webhook
    pub alert_webhook: Option<String>,
    #[serde(default)]
    pub telegram: TelegramConfig,
}

fn default_log_level() -> String { "info".to_string() }
fn default_metrics_port() -> u16 { 9090 }
fn default_true() -> bool { true }

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            log_file: None,
            metrics_port: default_metrics_port(),
            enable_metrics: false,
            enable_alerts: true,
            alert_webhook: None,
            telegram: TelegramConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
}
