//! Atoms — the typed nodes and links stored in the graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use swarmcog_core::{AtomId, Error, Result};

/// Confidence assigned to every trust link.
pub const TRUST_CONFIDENCE: f64 = 0.8;

/// Closed set of atom type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AtomType {
    Node,
    Link,

    AgentNode,
    CapabilityNode,
    GoalNode,
    BeliefNode,
    MemoryNode,

    CollaborationLink,
    DelegationLink,
    TrustLink,
    KnowledgeLink,
    EvaluationLink,
}

impl AtomType {
    pub const ALL: [AtomType; 12] = [
        AtomType::Node,
        AtomType::Link,
        AtomType::AgentNode,
        AtomType::CapabilityNode,
        AtomType::GoalNode,
        AtomType::BeliefNode,
        AtomType::MemoryNode,
        AtomType::CollaborationLink,
        AtomType::DelegationLink,
        AtomType::TrustLink,
        AtomType::KnowledgeLink,
        AtomType::EvaluationLink,
    ];

    pub fn is_link(self) -> bool {
        matches!(
            self,
            Self::Link
                | Self::CollaborationLink
                | Self::DelegationLink
                | Self::TrustLink
                | Self::KnowledgeLink
                | Self::EvaluationLink
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Node => "Node",
            Self::Link => "Link",
            Self::AgentNode => "AgentNode",
            Self::CapabilityNode => "CapabilityNode",
            Self::GoalNode => "GoalNode",
            Self::BeliefNode => "BeliefNode",
            Self::MemoryNode => "MemoryNode",
            Self::CollaborationLink => "CollaborationLink",
            Self::DelegationLink => "DelegationLink",
            Self::TrustLink => "TrustLink",
            Self::KnowledgeLink => "KnowledgeLink",
            Self::EvaluationLink => "EvaluationLink",
        }
    }
}

impl fmt::Display for AtomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Belief certainty. Both fields stay within [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TruthValue {
    strength: f64,
    confidence: f64,
}

impl TruthValue {
    pub fn new(strength: f64, confidence: f64) -> Self {
        Self {
            strength: clamp_unit(strength),
            confidence: clamp_unit(confidence),
        }
    }

    pub fn strength(&self) -> f64 {
        self.strength
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn with_strength(self, strength: f64) -> Self {
        Self::new(strength, self.confidence)
    }
}

impl Default for TruthValue {
    fn default() -> Self {
        Self {
            strength: 0.5,
            confidence: 0.0,
        }
    }
}

/// Salience of an atom. `sti` and `lti` stay within [-1, 1], `vlti` within [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AttentionValue {
    sti: f64,
    lti: f64,
    vlti: f64,
}

impl AttentionValue {
    pub fn new(sti: f64, lti: f64, vlti: f64) -> Self {
        Self {
            sti: clamp_signed(sti),
            lti: clamp_signed(lti),
            vlti: clamp_unit(vlti),
        }
    }

    pub fn sti(&self) -> f64 {
        self.sti
    }

    pub fn lti(&self) -> f64 {
        self.lti
    }

    pub fn vlti(&self) -> f64 {
        self.vlti
    }

    /// Ranking key used by the most-important query.
    pub fn importance(&self) -> f64 {
        self.sti + self.lti
    }

    /// Additive update; each field is clamped after its delta.
    pub fn shifted(&self, d_sti: f64, d_lti: f64, d_vlti: f64) -> Self {
        Self::new(self.sti + d_sti, self.lti + d_lti, self.vlti + d_vlti)
    }

    /// One decay step: short-term importance fades and leaks into the longer horizons.
    pub fn decayed(&self) -> Self {
        let sti = self.sti * 0.99;
        let lti = self.lti * 0.999 + sti * 0.001;
        let vlti = self.vlti * 0.9999 + lti * 0.0001;
        Self::new(sti, lti, vlti)
    }
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

fn clamp_signed(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(-1.0, 1.0)
    }
}

/// Node payload or link targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AtomKind {
    Node { value: Option<Value> },
    Link { outgoing: Vec<AtomId> },
}

/// A graph element. Callers work with snapshots; the graph owns the live copy.
#[derive(Debug, Clone, Serialize)]
pub struct Atom {
    id: AtomId,
    #[serde(rename = "type")]
    atom_type: AtomType,
    name: String,
    #[serde(flatten)]
    kind: AtomKind,
    truth_value: TruthValue,
    attention_value: AttentionValue,
    created_at: DateTime<Utc>,
    metadata: BTreeMap<String, Value>,
}

impl Atom {
    fn base(atom_type: AtomType, name: Option<String>, kind: AtomKind) -> Self {
        let id = AtomId::new();
        let name = name.unwrap_or_else(|| format!("{}_{}", atom_type, id.short()));
        Self {
            id,
            atom_type,
            name,
            kind,
            truth_value: TruthValue::default(),
            attention_value: AttentionValue::default(),
            created_at: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    /// A node without payload.
    pub fn node(atom_type: AtomType, name: impl Into<String>) -> Self {
        Self::base(atom_type, Some(name.into()), AtomKind::Node { value: None })
    }

    /// A link over `outgoing`. Rejects an empty target list and non-link type tags.
    pub fn link(atom_type: AtomType, outgoing: Vec<AtomId>) -> Result<Self> {
        if outgoing.is_empty() {
            return Err(Error::invalid_atom(format!(
                "{} constructed with an empty target sequence",
                atom_type
            )));
        }
        if !atom_type.is_link() {
            return Err(Error::invalid_atom(format!(
                "{} is not a link type",
                atom_type
            )));
        }
        Ok(Self::base(atom_type, None, AtomKind::Link { outgoing }))
    }

    pub fn agent(name: impl Into<String>) -> Self {
        Self::node(AtomType::AgentNode, name)
    }

    pub fn capability(name: impl Into<String>) -> Self {
        Self::node(AtomType::CapabilityNode, name)
    }

    pub fn goal(name: impl Into<String>, priority: f64) -> Self {
        Self::node(AtomType::GoalNode, name).with_metadata("priority", clamp_unit(priority))
    }

    pub fn belief(name: impl Into<String>, value: Value) -> Self {
        Self::node(AtomType::BeliefNode, name).with_value(value)
    }

    pub fn memory(name: impl Into<String>) -> Self {
        Self::node(AtomType::MemoryNode, name)
    }

    // -- builders --------------------------------------------------------

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the payload. Links carry no payload, so this is a no-op for them.
    pub fn with_value(mut self, value: Value) -> Self {
        if let AtomKind::Node { value: ref mut slot } = self.kind {
            *slot = Some(value);
        }
        self
    }

    pub fn with_truth(mut self, truth: TruthValue) -> Self {
        self.truth_value = truth;
        self
    }

    pub fn with_attention(mut self, attention: AttentionValue) -> Self {
        self.attention_value = attention;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    // -- accessors -------------------------------------------------------

    pub fn id(&self) -> AtomId {
        self.id
    }

    pub fn atom_type(&self) -> AtomType {
        self.atom_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &AtomKind {
        &self.kind
    }

    pub fn truth_value(&self) -> TruthValue {
        self.truth_value
    }

    pub fn attention_value(&self) -> AttentionValue {
        self.attention_value
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    pub fn metadata_value(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    pub fn value(&self) -> Option<&Value> {
        match &self.kind {
            AtomKind::Node { value } => value.as_ref(),
            AtomKind::Link { .. } => None,
        }
    }

    /// Link targets in order; empty for nodes.
    pub fn outgoing(&self) -> &[AtomId] {
        match &self.kind {
            AtomKind::Node { .. } => &[],
            AtomKind::Link { outgoing } => outgoing,
        }
    }

    pub fn is_link(&self) -> bool {
        matches!(self.kind, AtomKind::Link { .. })
    }

    pub fn arity(&self) -> usize {
        self.outgoing().len()
    }

    pub(crate) fn set_truth_value(&mut self, truth: TruthValue) {
        self.truth_value = truth;
    }

    pub(crate) fn set_attention_value(&mut self, attention: AttentionValue) {
        self.attention_value = attention;
    }
}

impl PartialEq for Atom {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Atom {}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            AtomKind::Node { .. } => write!(f, "{}({})", self.atom_type, self.name),
            AtomKind::Link { outgoing } => {
                let targets: Vec<String> = outgoing.iter().map(|id| id.short()).collect();
                write!(f, "{}({})", self.atom_type, targets.join(", "))
            }
        }
    }
}
