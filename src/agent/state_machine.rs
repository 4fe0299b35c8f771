//! Decision State Machine
//!
//! Tracks the decision tag of one pipeline run:
//! - INIT: fresh record, SCAN runs next
//! - AUDIT: a strategy and price are in hand, AUDIT runs next
//! - SIZE: the token passed audit, SIZE runs next
//! - DONE: terminal, nothing left to do or a bet was sized
//! - ABORT: terminal, market unreachable or audit rejected
//!
//! Routing is a pure function of the tag so each branch can be tested on its
//! own.

use serde::Serialize;
use tracing::{info, warn};

use crate::utils::types::{DecisionTag, Directive};

/// Pipeline stage selected by the router
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Scan,
    Audit,
    Size,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Scan => write!(f, "SCAN"),
            Stage::Audit => write!(f, "AUDIT"),
            Stage::Size => write!(f, "SIZE"),
        }
    }
}

pub fn should_scan(tag: DecisionTag) -> bool {
    tag == DecisionTag::Init
}

pub fn should_audit(tag: DecisionTag) -> bool {
    tag == DecisionTag::Audit
}

pub fn should_size(tag: DecisionTag) -> bool {
    tag == DecisionTag::Size
}

/// Next stage for a decision tag; `None` once the tag is terminal
pub fn next_stage(tag: DecisionTag) -> Option<Stage> {
    if should_scan(tag) {
        Some(Stage::Scan)
    } else if should_audit(tag) {
        Some(Stage::Audit)
    } else if should_size(tag) {
        Some(Stage::Size)
    } else {
        None
    }
}

/// Orchestration state for one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionRecord {
    pub capital: f64,
    pub symbol: String,
    pub directive: Directive,
    /// Name of the selected approved strategy
    pub strategy: Option<String>,
    pub price: f64,
    /// Audit verdict, once AUDIT has run
    pub is_safe: Option<bool>,
    pub decision: DecisionTag,
    pub message: String,
    /// Latest average true range, when candles were available
    pub volatility: Option<f64>,
    pub bet_size: Option<f64>,
    pub stop_price: Option<f64>,
}

impl DecisionRecord {
    pub fn new(capital: f64, symbol: impl Into<String>, directive: Directive) -> Self {
        Self {
            capital,
            symbol: symbol.into(),
            directive,
            strategy: None,
            price: 0.0,
            is_safe: None,
            decision: DecisionTag::Init,
            message: String::new(),
            volatility: None,
            bet_size: None,
            stop_price: None,
        }
    }

    /// Merge a stage's partial update; absent fields keep their value
    pub fn apply(&mut self, update: RecordUpdate) {
        if let Some(capital) = update.capital {
            self.capital = capital;
        }
        if let Some(strategy) = update.strategy {
            self.strategy = Some(strategy);
        }
        if let Some(price) = update.price {
            self.price = price;
        }
        if let Some(is_safe) = update.is_safe {
            self.is_safe = Some(is_safe);
        }
        if let Some(decision) = update.decision {
            self.decision = decision;
        }
        if let Some(message) = update.message {
            self.message = message;
        }
        if let Some(volatility) = update.volatility {
            self.volatility = Some(volatility);
        }
        if let Some(bet_size) = update.bet_size {
            self.bet_size = Some(bet_size);
        }
        if let Some(stop_price) = update.stop_price {
            self.stop_price = Some(stop_price);
        }
    }
}

/// Partial update returned by a stage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordUpdate {
    pub capital: Option<f64>,
    pub strategy: Option<String>,
    pub price: Option<f64>,
    pub is_safe: Option<bool>,
    pub decision: Option<DecisionTag>,
    pub message: Option<String>,
    pub volatility: Option<f64>,
    pub bet_size: Option<f64>,
    pub stop_price: Option<f64>,
}

impl RecordUpdate {
    pub fn decision(tag: DecisionTag, message: impl Into<String>) -> Self {
        Self {
            decision: Some(tag),
            message: Some(message.into()),
            ..Self::default()
        }
    }
}

/// Transition record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateTransition {
    pub from: DecisionTag,
    pub to: DecisionTag,
    pub timestamp: i64,
    pub reason: Option<String>,
}

/// Validates and records decision-tag transitions
#[derive(Debug, Clone)]
pub struct DecisionStateMachine {
    current: DecisionTag,
    history: Vec<StateTransition>,
}

impl DecisionStateMachine {
    pub fn new() -> Self {
        Self {
            current: DecisionTag::Init,
            history: Vec::new(),
        }
    }

    pub fn current_state(&self) -> DecisionTag {
        self.current
    }

    pub fn can_transition_to(&self, target: DecisionTag) -> bool {
        use DecisionTag::*;

        match (self.current, target) {
            // SCAN outcomes
            (Init, Audit) => true,
            (Init, Done) => true,
            (Init, Abort) => true,

            // AUDIT outcomes
            (Audit, Size) => true,
            (Audit, Abort) => true,

            // SIZE outcome
            (Size, Done) => true,

            _ => false,
        }
    }

    /// Move to `target`, returning false and staying put when the table
    /// forbids it
    pub fn transition_to_with_reason(&mut self, target: DecisionTag, reason: Option<String>) -> bool {
        if !self.can_transition_to(target) {
            warn!("Invalid decision transition: {} -> {}", self.current, target);
            return false;
        }

        info!(
            "Decision: {} -> {}{}",
            self.current,
            target,
            reason.as_deref().map(|r| format!(" ({})", r)).unwrap_or_default()
        );

        self.history.push(StateTransition {
            from: self.current,
            to: target,
            timestamp: chrono::Utc::now().timestamp_millis(),
            reason,
        });
        self.current = target;
        true
    }

    pub fn history(&self) -> &[StateTransition] {
        &self.history
    }

    pub fn into_history(self) -> Vec<StateTransition> {
        self.history
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }
}

impl Default for DecisionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
