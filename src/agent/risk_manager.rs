//! Risk Manager
//!
//! Adaptive position sizing:
//! - Pure Kelly fraction from win probability and payoff ratio
//! - Capital phase scales the fraction down as the account grows
//! - Hard ceiling on the fraction of capital per trade
//! - Volatility-based technical stop

use std::fmt;
use tracing::debug;

use crate::config::RiskConfig;

/// Upper bound (exclusive) of the growth-aggressive band
pub const AGGRESSIVE_CAPITAL_LIMIT: f64 = 1_000.0;
/// Upper bound (exclusive) of the growth-moderate band
pub const MODERATE_CAPITAL_LIMIT: f64 = 100_000.0;

/// Capital band deciding how much of the Kelly bet is taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskPhase {
    GrowthAggressive,
    GrowthModerate,
    InstitutionalPreservation,
}

impl RiskPhase {
    pub fn from_capital(capital: f64) -> Self {
        if capital < AGGRESSIVE_CAPITAL_LIMIT {
            RiskPhase::GrowthAggressive
        } else if capital < MODERATE_CAPITAL_LIMIT {
            RiskPhase::GrowthModerate
        } else {
            RiskPhase::InstitutionalPreservation
        }
    }

    pub fn kelly_multiplier(&self) -> f64 {
        match self {
            RiskPhase::GrowthAggressive => 0.5,
            RiskPhase::GrowthModerate => 0.3,
            RiskPhase::InstitutionalPreservation => 0.1,
        }
    }
}

impl fmt::Display for RiskPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskPhase::GrowthAggressive => write!(f, "growth-aggressive"),
            RiskPhase::GrowthModerate => write!(f, "growth-moderate"),
            RiskPhase::InstitutionalPreservation => write!(f, "institutional-preservation"),
        }
    }
}

/// Full breakdown of one sizing decision
#[derive(Debug, Clone, PartialEq)]
pub struct SizingDecision {
    pub capital: f64,
    pub phase: RiskPhase,
    pub pure_kelly: f64,
    /// Fraction of capital after phase scaling and the ceiling
    pub fraction: f64,
    pub bet_size: f64,
}

impl SizingDecision {
    pub fn is_trade(&self) -> bool {
        self.bet_size > 0.0
    }
}

/// Pure Kelly fraction `(p*b - q) / b`. Degenerate inputs yield 0.
pub fn pure_kelly(win_probability: f64, payoff_ratio: f64) -> f64 {
    if !(0.0..=1.0).contains(&win_probability) || payoff_ratio <= 0.0 || !payoff_ratio.is_finite() {
        return 0.0;
    }
    let loss_probability = 1.0 - win_probability;
    (win_probability * payoff_ratio - loss_probability) / payoff_ratio
}

/// Fractional-Kelly position sizer
#[derive(Debug, Clone)]
pub struct RiskManager {
    config: RiskConfig,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Size a trade with the configured edge assumptions
    pub fn size(&self, capital: f64) -> SizingDecision {
        self.size_with(capital, self.config.win_probability, self.config.payoff_ratio)
    }

    /// Size a trade with explicit edge assumptions
    pub fn size_with(&self, capital: f64, win_probability: f64, payoff_ratio: f64) -> SizingDecision {
        let phase = RiskPhase::from_capital(capital);
        let kelly = pure_kelly(win_probability, payoff_ratio);

        let no_trade = SizingDecision {
            capital,
            phase,
            pure_kelly: kelly,
            fraction: 0.0,
            bet_size: 0.0,
        };

        if kelly <= 0.0 {
            debug!("Non-positive edge (Kelly {:.4}), no trade", kelly);
            return no_trade;
        }
        if !capital.is_finite() || capital <= 0.0 {
            return no_trade;
        }

        let fraction = (kelly * phase.kelly_multiplier()).min(self.config.max_fraction);
        let bet_size = capital * fraction;

        debug!(
            "Sizing: phase {} | Kelly {:.4} x {} -> {:.4} | bet {:.2}",
            phase,
            kelly,
            phase.kelly_multiplier(),
            fraction,
            bet_size
        );

        SizingDecision {
            capital,
            phase,
            pure_kelly: kelly,
            fraction,
            bet_size,
        }
    }

    /// Bet size only
    pub fn bet_size(&self, capital: f64) -> f64 {
        self.size(capital).bet_size
    }

    /// Stop for a long entry: entry minus a multiple of volatility
    pub fn stop_price(&self, entry_price: f64, volatility: f64) -> f64 {
        entry_price - volatility.abs() * self.config.stop_volatility_multiple
    }
}
