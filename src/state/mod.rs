//! Persisted State Module
//!
//! The single durable record: capital and the list of open positions. Owned by
//! the lifecycle controller, read at cycle start and written at cycle end.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::strategy::library::write_json_atomic;
use crate::utils::types::PositionRecord;

/// Capital used when no usable state file exists
pub const DEFAULT_CAPITAL: f64 = 15.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    pub capital: f64,
    #[serde(rename = "posiciones", default)]
    pub positions: Vec<PositionRecord>,
}

impl PersistedState {
    pub fn with_capital(capital: f64) -> Self {
        Self {
            capital,
            positions: Vec::new(),
        }
    }

    pub fn has_positions(&self) -> bool {
        !self.positions.is_empty()
    }
}

impl Default for PersistedState {
    fn default() -> Self {
        Self::with_capital(DEFAULT_CAPITAL)
    }
}

/// File-backed store for [`PersistedState`]
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
    default_capital: f64,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>, default_capital: f64) -> Self {
        Self {
            path: path.into(),
            default_capital,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn default_state(&self) -> PersistedState {
        PersistedState::with_capital(self.default_capital)
    }

    /// Read the state; a missing, unreadable or invalid file yields the default
    pub async fn load(&self) -> PersistedState {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No state file at {:?}, starting fresh", self.path);
                return self.default_state();
            }
            Err(e) => {
                warn!("Failed to read state file {:?}: {}", self.path, e);
                return self.default_state();
            }
        };

        match serde_json::from_str::<PersistedState>(&content) {
            Ok(state) if state.capital >= 0.0 && state.capital.is_finite() => state,
            Ok(state) => {
                warn!("State file has invalid capital {}, using defaults", state.capital);
                self.default_state()
            }
            Err(e) => {
                warn!("Malformed state file {:?}: {}, using defaults", self.path, e);
                self.default_state()
            }
        }
    }

    pub async fn save(&self, state: &PersistedState) -> Result<()> {
        let content = serde_json::to_string_pretty(state).context("Failed to serialize state")?;
        write_json_atomic(&self.path, content).await?;
        info!(
            "State saved: capital {:.2}, {} open positions",
            state.capital,
            state.positions.len()
        );
        Ok(())
    }
}
