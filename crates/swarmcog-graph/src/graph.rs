//! AtomGraph — the shared knowledge store.
//!
//! Atoms live in one map guarded by a single mutex together with the three
//! secondary indices (type, name, incoming links), so a multi-index update is
//! never observable half-done. Reads take the same lock.

use crate::atom::{Atom, AtomType, TruthValue, TRUST_CONFIDENCE};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use swarmcog_core::{AtomId, Error, GraphConfig, Result};
use tracing::{debug, info};

struct Entry {
    atom: Atom,
    /// Insertion order, used for stable tie-breaking.
    seq: u64,
}

#[derive(Default)]
struct GraphInner {
    atoms: HashMap<AtomId, Entry>,
    type_index: HashMap<AtomType, HashSet<AtomId>>,
    name_index: HashMap<String, HashSet<AtomId>>,
    /// target id → ids of links that reference it
    incoming_index: HashMap<AtomId, HashSet<AtomId>>,
    next_seq: u64,
}

impl GraphInner {
    fn insert(&mut self, atom: Atom, max_atoms: Option<usize>) -> Result<Atom> {
        if let Some(existing) = self.atoms.get(&atom.id()) {
            return Ok(existing.atom.clone());
        }

        if atom.is_link() != atom.atom_type().is_link() {
            return Err(Error::invalid_atom(format!(
                "{} tag does not match its {} shape",
                atom.atom_type(),
                if atom.is_link() { "link" } else { "node" }
            )));
        }
        if atom.is_link() && atom.outgoing().is_empty() {
            return Err(Error::invalid_atom(format!(
                "{} has an empty target sequence",
                atom.atom_type()
            )));
        }
        if let Some(missing) = atom.outgoing().iter().find(|t| !self.atoms.contains_key(*t)) {
            return Err(Error::invalid_atom(format!(
                "{} references {} which is not in the graph",
                atom.atom_type(),
                missing
            )));
        }
        self.ensure_room(1, max_atoms)?;

        let id = atom.id();
        self.type_index.entry(atom.atom_type()).or_default().insert(id);
        self.name_index
            .entry(atom.name().to_string())
            .or_default()
            .insert(id);
        for target in atom.outgoing() {
            self.incoming_index.entry(*target).or_default().insert(id);
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.atoms.insert(
            id,
            Entry {
                atom: atom.clone(),
                seq,
            },
        );
        Ok(atom)
    }

    fn ensure_room(&self, extra: usize, max_atoms: Option<usize>) -> Result<()> {
        match max_atoms {
            Some(max) if self.atoms.len() + extra > max => Err(Error::CapacityExceeded(format!(
                "graph holds {} of {} atoms, cannot add {}",
                self.atoms.len(),
                max,
                extra
            ))),
            _ => Ok(()),
        }
    }

    /// Removes one atom from the map and every index. Returns the ids of links
    /// that referenced it (they must go too).
    fn unlink(&mut self, id: &AtomId) -> Option<Vec<AtomId>> {
        let entry = self.atoms.remove(id)?;
        let atom = entry.atom;

        if let Some(set) = self.type_index.get_mut(&atom.atom_type()) {
            set.remove(id);
            if set.is_empty() {
                self.type_index.remove(&atom.atom_type());
            }
        }
        if let Some(set) = self.name_index.get_mut(atom.name()) {
            set.remove(id);
            if set.is_empty() {
                self.name_index.remove(atom.name());
            }
        }
        for target in atom.outgoing() {
            if let Some(set) = self.incoming_index.get_mut(target) {
                set.remove(id);
                if set.is_empty() {
                    self.incoming_index.remove(target);
                }
            }
        }

        let dependents = self
            .incoming_index
            .remove(id)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();
        Some(dependents)
    }

    fn sorted(&self, ids: impl Iterator<Item = AtomId>) -> Vec<Atom> {
        let mut entries: Vec<&Entry> = ids.filter_map(|id| self.atoms.get(&id)).collect();
        entries.sort_by_key(|e| e.seq);
        entries.into_iter().map(|e| e.atom.clone()).collect()
    }

    fn find(&self, atom_type: Option<AtomType>, name: Option<&str>) -> Vec<Atom> {
        let empty = HashSet::new();
        let by_type = atom_type.map(|t| self.type_index.get(&t).unwrap_or(&empty));
        let by_name = name.map(|n| self.name_index.get(n).unwrap_or(&empty));

        match (by_type, by_name) {
            (Some(t), Some(n)) => self.sorted(t.intersection(n).copied()),
            (Some(t), None) => self.sorted(t.iter().copied()),
            (None, Some(n)) => self.sorted(n.iter().copied()),
            (None, None) => self.sorted(self.atoms.keys().copied()),
        }
    }

    fn incoming(&self, id: &AtomId) -> Vec<Atom> {
        match self.incoming_index.get(id) {
            Some(set) => self.sorted(set.iter().copied()),
            None => Vec::new(),
        }
    }

    fn trust_link(&self, trustor: &AtomId, trustee: &AtomId) -> Option<&Entry> {
        let links = self.type_index.get(&AtomType::TrustLink)?;
        links
            .iter()
            .filter_map(|id| self.atoms.get(id))
            .filter(|e| e.atom.outgoing() == [*trustor, *trustee])
            .min_by_key(|e| e.seq)
    }
}

/// Index-derived counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphStatistics {
    pub total_atoms: usize,
    pub total_links: usize,
    pub atom_types: BTreeMap<AtomType, usize>,
    pub incoming_entries: usize,
}

/// Full copy of the graph for status/export consumers.
#[derive(Debug, Clone, Serialize)]
pub struct GraphSnapshot {
    pub name: String,
    /// Atoms in insertion order.
    pub atoms: Vec<Atom>,
    pub statistics: GraphStatistics,
    pub timestamp: DateTime<Utc>,
}

/// The shared knowledge graph.
pub struct AtomGraph {
    name: String,
    max_atoms: Option<usize>,
    inner: Mutex<GraphInner>,
}

impl Default for AtomGraph {
    fn default() -> Self {
        Self::from_config(&GraphConfig::default())
    }
}

impl AtomGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_atoms: None,
            inner: Mutex::new(GraphInner::default()),
        }
    }

    pub fn from_config(config: &GraphConfig) -> Self {
        Self::new(config.name.clone()).with_max_atoms(config.max_atoms)
    }

    pub fn with_max_atoms(mut self, max_atoms: Option<usize>) -> Self {
        self.max_atoms = max_atoms;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.inner.lock().atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ── Basic atom operations ─────────────────────────────

    /// Insert an atom. Idempotent by id: an existing atom is returned unchanged.
    pub fn add_atom(&self, atom: Atom) -> Result<Atom> {
        self.inner.lock().insert(atom, self.max_atoms)
    }

    pub fn get_atom(&self, id: &AtomId) -> Option<Atom> {
        self.inner.lock().atoms.get(id).map(|e| e.atom.clone())
    }

    pub fn contains(&self, id: &AtomId) -> bool {
        self.inner.lock().atoms.contains_key(id)
    }

    /// Atoms matching both filters; `None` matches everything.
    pub fn find_atoms(&self, atom_type: Option<AtomType>, name: Option<&str>) -> Vec<Atom> {
        self.inner.lock().find(atom_type, name)
    }

    /// Links whose outgoing sequence references `id`.
    pub fn get_incoming(&self, id: &AtomId) -> Vec<Atom> {
        self.inner.lock().incoming(id)
    }

    /// Remove an atom and, recursively, every link that references it.
    /// Returns the ids removed, the requested atom first.
    pub fn remove_atom(&self, id: &AtomId) -> Result<Vec<AtomId>> {
        let mut inner = self.inner.lock();
        if !inner.atoms.contains_key(id) {
            return Err(Error::AtomNotFound(*id));
        }

        let mut removed = Vec::new();
        let mut pending = vec![*id];
        while let Some(next) = pending.pop() {
            if let Some(dependents) = inner.unlink(&next) {
                removed.push(next);
                pending.extend(dependents);
            }
        }
        debug!("Removed {} atoms from {} (root {})", removed.len(), self.name, id);
        Ok(removed)
    }

    pub fn clear(&self) {
        *self.inner.lock() = GraphInner::default();
        info!("Cleared AtomGraph: {}", self.name);
    }

    // ── Agent-specific operations ─────────────────────────

    pub fn get_agents(&self) -> Vec<Atom> {
        self.find_atoms(Some(AtomType::AgentNode), None)
    }

    /// Earliest-inserted agent node with this name.
    pub fn find_agent(&self, name: &str) -> Option<Atom> {
        self.inner
            .lock()
            .find(Some(AtomType::AgentNode), Some(name))
            .into_iter()
            .next()
    }

    /// Agent node plus, per capability, a capability node and a knowledge link
    /// agent → capability. Inserted under one lock; all or nothing.
    pub fn add_agent_node<S: AsRef<str>>(&self, name: &str, capabilities: &[S]) -> Result<Atom> {
        let mut inner = self.inner.lock();
        inner.ensure_room(1 + 2 * capabilities.len(), self.max_atoms)?;

        let agent = inner.insert(Atom::agent(name), self.max_atoms)?;
        for cap in capabilities {
            let cap_node = inner.insert(Atom::capability(cap.as_ref()), self.max_atoms)?;
            let link = Atom::link(AtomType::KnowledgeLink, vec![agent.id(), cap_node.id()])?
                .with_metadata("relation", "has_capability");
            inner.insert(link, self.max_atoms)?;
        }
        debug!(
            "Added agent node {} with {} capabilities",
            name,
            capabilities.len()
        );
        Ok(agent)
    }

    pub fn add_collaboration_link(&self, a: &AtomId, b: &AtomId, kind: &str) -> Result<Atom> {
        let link = Atom::link(AtomType::CollaborationLink, vec![*a, *b])?
            .with_metadata("collaboration_type", kind);
        self.add_atom(link)
    }

    /// Directional trust. `level` is clamped to [0, 1].
    pub fn add_trust_relationship(&self, trustor: &AtomId, trustee: &AtomId, level: f64) -> Result<Atom> {
        let link = Atom::link(AtomType::TrustLink, vec![*trustor, *trustee])?
            .with_truth(TruthValue::new(level, TRUST_CONFIDENCE));
        self.add_atom(link)
    }

    pub fn add_knowledge_link(&self, source: &AtomId, target: &AtomId, relation: &str) -> Result<Atom> {
        let link = Atom::link(AtomType::KnowledgeLink, vec![*source, *target])?
            .with_metadata("relation", relation);
        self.add_atom(link)
    }

    // ── Query operations ──────────────────────────────────

    /// Distinct agents sharing a collaboration link with `agent`, in link order.
    pub fn get_collaborators(&self, agent: &AtomId) -> Vec<Atom> {
        let inner = self.inner.lock();
        let mut seen = HashSet::new();
        let mut collaborators = Vec::new();
        for link in inner.incoming(agent) {
            if link.atom_type() != AtomType::CollaborationLink {
                continue;
            }
            for other in link.outgoing() {
                if other == agent || !seen.insert(*other) {
                    continue;
                }
                if let Some(entry) = inner.atoms.get(other) {
                    if entry.atom.atom_type() == AtomType::AgentNode {
                        collaborators.push(entry.atom.clone());
                    }
                }
            }
        }
        collaborators
    }

    /// Strength of the trust link trustor → trustee, if one exists.
    pub fn get_trust_level(&self, trustor: &AtomId, trustee: &AtomId) -> Option<f64> {
        self.inner
            .lock()
            .trust_link(trustor, trustee)
            .map(|e| e.atom.truth_value().strength())
    }

    pub fn get_trust_link(&self, trustor: &AtomId, trustee: &AtomId) -> Option<Atom> {
        self.inner
            .lock()
            .trust_link(trustor, trustee)
            .map(|e| e.atom.clone())
    }

    /// Number of atoms created at or after `since`.
    pub fn count_created_since(&self, since: DateTime<Utc>) -> usize {
        self.inner
            .lock()
            .atoms
            .values()
            .filter(|e| e.atom.created_at() >= since)
            .count()
    }

    // ── Truth and attention ───────────────────────────────

    pub fn set_truth_value(&self, id: &AtomId, truth: TruthValue) -> Result<()> {
        let mut inner = self.inner.lock();
        let entry = inner.atoms.get_mut(id).ok_or(Error::AtomNotFound(*id))?;
        entry.atom.set_truth_value(truth);
        Ok(())
    }

    /// Additive attention update, each field clamped after its delta.
    pub fn update_attention(&self, id: &AtomId, d_sti: f64, d_lti: f64, d_vlti: f64) -> Result<()> {
        let mut inner = self.inner.lock();
        let entry = inner.atoms.get_mut(id).ok_or(Error::AtomNotFound(*id))?;
        let shifted = entry.atom.attention_value().shifted(d_sti, d_lti, d_vlti);
        entry.atom.set_attention_value(shifted);
        Ok(())
    }

    /// One decay step over every atom.
    pub fn decay_attention(&self) {
        let mut inner = self.inner.lock();
        for entry in inner.atoms.values_mut() {
            let decayed = entry.atom.attention_value().decayed();
            entry.atom.set_attention_value(decayed);
        }
    }

    /// Top `limit` atoms by `sti + lti`, ties in insertion order.
    pub fn get_most_important_atoms(&self, limit: usize) -> Vec<Atom> {
        let inner = self.inner.lock();
        let mut ranked: Vec<(f64, u64, &Atom)> = inner
            .atoms
            .values()
            .map(|e| (e.atom.attention_value().importance(), e.seq, &e.atom))
            .collect();
        ranked.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        ranked
            .into_iter()
            .take(limit)
            .map(|(_, _, atom)| atom.clone())
            .collect()
    }

    // ── Statistics ────────────────────────────────────────

    pub fn statistics(&self) -> GraphStatistics {
        Self::statistics_of(&self.inner.lock())
    }

    fn statistics_of(inner: &GraphInner) -> GraphStatistics {
        GraphStatistics {
            total_atoms: inner.atoms.len(),
            total_links: inner.atoms.values().filter(|e| e.atom.is_link()).count(),
            atom_types: inner
                .type_index
                .iter()
                .map(|(t, ids)| (*t, ids.len()))
                .collect(),
            incoming_entries: inner.incoming_index.values().map(|s| s.len()).sum(),
        }
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        let inner = self.inner.lock();
        GraphSnapshot {
            name: self.name.clone(),
            atoms: inner.sorted(inner.atoms.keys().copied()),
            statistics: Self::statistics_of(&inner),
            timestamp: Utc::now(),
        }
    }
}

impl std::fmt::Display for AtomGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AtomGraph({}): {} atoms", self.name, self.len())
    }
}
