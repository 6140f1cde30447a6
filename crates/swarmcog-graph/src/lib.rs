//! swarmcog-graph — shared knowledge graph of typed atoms
//!
//! Nodes and links carry truth and attention values. The graph keeps
//! type, name, and incoming-link indices consistent under one lock.

pub mod atom;
pub mod graph;

pub use atom::{Atom, AtomKind, AtomType, AttentionValue, TruthValue, TRUST_CONFIDENCE};
pub use graph::{AtomGraph, GraphSnapshot, GraphStatistics};
