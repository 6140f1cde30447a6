//! Error types for SwarmCog

use crate::types::{AgentId, AtomId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("agent not found: {0}")]
    AgentNotFound(AgentId),

    #[error("atom not found: {0}")]
    AtomNotFound(AtomId),

    #[error("invalid atom: {0}")]
    InvalidAtom(String),

    #[error("processing failure: {agent} in {phase} - {reason}")]
    ProcessingFailure {
        agent: AgentId,
        phase: String,
        reason: String,
    },

    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    TomlError(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn invalid_atom(reason: impl Into<String>) -> Self {
        Self::InvalidAtom(reason.into())
    }

    pub fn processing_failure(
        agent: AgentId,
        phase: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::ProcessingFailure {
            agent,
            phase: phase.into(),
            reason: reason.into(),
        }
    }

    /// True for the NotFound family (unknown agent or atom id).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::AgentNotFound(_) | Self::AtomNotFound(_))
    }
}
