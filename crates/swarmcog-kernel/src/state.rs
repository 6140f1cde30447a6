//! Per-agent cognitive state and the phase ring.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use swarmcog_core::{AgentId, AtomId};

/// One stage of the cognitive cycle. The ring has no terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CognitivePhase {
    Perception,
    Attention,
    Reasoning,
    Planning,
    Execution,
    Learning,
    Reflection,
}

impl CognitivePhase {
    pub const RING: [CognitivePhase; 7] = [
        CognitivePhase::Perception,
        CognitivePhase::Attention,
        CognitivePhase::Reasoning,
        CognitivePhase::Planning,
        CognitivePhase::Execution,
        CognitivePhase::Learning,
        CognitivePhase::Reflection,
    ];

    pub fn next(self) -> Self {
        match self {
            Self::Perception => Self::Attention,
            Self::Attention => Self::Reasoning,
            Self::Reasoning => Self::Planning,
            Self::Planning => Self::Execution,
            Self::Execution => Self::Learning,
            Self::Learning => Self::Reflection,
            Self::Reflection => Self::Perception,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Perception => "perception",
            Self::Attention => "attention",
            Self::Reasoning => "reasoning",
            Self::Planning => "planning",
            Self::Execution => "execution",
            Self::Learning => "learning",
            Self::Reflection => "reflection",
        }
    }
}

impl std::fmt::Display for CognitivePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable record of one agent's mind.
///
/// Working-memory timestamps are Unix seconds as JSON numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CognitiveState {
    pub agent_id: AgentId,
    pub phase: CognitivePhase,
    pub goals: Vec<String>,
    pub beliefs: BTreeMap<String, Value>,
    pub intentions: Vec<String>,
    pub working_memory: BTreeMap<String, Value>,
    pub attention_focus: Vec<AtomId>,
    pub activation_level: f64,
    /// Phase transitions applied so far.
    pub steps: u64,
    pub updated_at: DateTime<Utc>,
}

impl CognitiveState {
    pub fn new(agent_id: AgentId, goals: Vec<String>, beliefs: BTreeMap<String, Value>) -> Self {
        Self {
            agent_id,
            phase: CognitivePhase::Perception,
            goals,
            beliefs,
            intentions: Vec::new(),
            working_memory: BTreeMap::new(),
            attention_focus: Vec::new(),
            activation_level: 1.0,
            steps: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn name(&self) -> &str {
        self.agent_id.as_str()
    }

    /// Adds to the attention focus unless already present.
    pub fn focus_on(&mut self, id: AtomId) {
        if !self.attention_focus.contains(&id) {
            self.attention_focus.push(id);
        }
    }

    /// Records `now` under `key` in working memory.
    pub fn stamp(&mut self, key: impl Into<String>) {
        self.working_memory.insert(key.into(), Value::from(unix_now()));
    }

    pub fn set_activation(&mut self, level: f64) {
        self.activation_level = level.clamp(0.0, 1.0);
    }

    /// Appends goals not already present, keeping order.
    pub fn merge_goals<I: IntoIterator<Item = String>>(&mut self, goals: I) {
        for goal in goals {
            if !self.goals.contains(&goal) {
                self.goals.push(goal);
            }
        }
    }

    /// Key-wise overwrite.
    pub fn merge_beliefs<I: IntoIterator<Item = (String, Value)>>(&mut self, beliefs: I) {
        self.beliefs.extend(beliefs);
    }
}

/// Current wall-clock time as fractional Unix seconds.
pub fn unix_now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
