//! Swarm configuration
//!
//! All tunable parameters in one place. Loaded from TOML at startup,
//! falls back to defaults if no config file exists.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level swarm configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    /// Knowledge graph parameters.
    pub graph: GraphConfig,
    /// Cycle scheduling parameters.
    pub scheduler: SchedulerConfig,
    /// Agents seeded at startup.
    pub agents: Vec<AgentSeed>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Display name of the shared graph.
    pub name: String,
    /// Upper bound on live atoms. `None` means unbounded.
    pub max_atoms: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Wait between two phases of one agent, in milliseconds.
    pub cycle_interval_ms: u64,
    /// Maximum number of registered agents.
    pub max_agents: usize,
}

/// An agent registered by the launcher at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSeed {
    pub name: String,
    pub capabilities: Vec<String>,
    pub goals: Vec<String>,
}

// ============================================================
// Defaults
// ============================================================

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            name: "swarmcog_space".into(),
            max_atoms: None,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cycle_interval_ms: 1_000,
            max_agents: 50,
        }
    }
}

// ============================================================
// Loading
// ============================================================

impl SwarmConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match Self::from_toml(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {} — using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config at {} — using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the current config as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    fn validate(&self) -> Result<()> {
        if self.scheduler.cycle_interval_ms == 0 {
            return Err(Error::ConfigError(
                "scheduler.cycle_interval_ms must be greater than zero".into(),
            ));
        }
        if self.scheduler.max_agents == 0 {
            return Err(Error::ConfigError(
                "scheduler.max_agents must be greater than zero".into(),
            ));
        }
        if let Some(seed) = self.agents.iter().find(|a| a.name.trim().is_empty()) {
            return Err(Error::ConfigError(format!(
                "agent seed with empty name (goals: {:?})",
                seed.goals
            )));
        }
        Ok(())
    }
}

impl SchedulerConfig {
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_millis(self.cycle_interval_ms)
    }
}
