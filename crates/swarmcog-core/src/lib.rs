//! SwarmCog Core - Identifiers, configuration, and error handling

pub mod config;
pub mod error;
pub mod types;

pub use config::{AgentSeed, GraphConfig, SchedulerConfig, SwarmConfig};
pub use error::{Error, Result};
pub use types::*;
