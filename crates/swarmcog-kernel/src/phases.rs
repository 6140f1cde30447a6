//! Phase processors — one deterministic heuristic per phase of the ring.
//!
//! Each processor works on a copy of the agent's state. A graph error aborts
//! the phase and the caller keeps the old state.

use crate::state::{unix_now, CognitivePhase, CognitiveState};
use chrono::{Duration, Utc};
use serde_json::{Map, Value};
use swarmcog_core::{Error, Result};
use swarmcog_graph::{Atom, AtomGraph};

/// Window for "recent" atoms and activity.
const RECENT_WINDOW_SECS: i64 = 60;
const FOCUS_LIMIT: usize = 5;
const GOAL_ATOMS_PER_GOAL: usize = 2;
const GOAL_STI_BOOST: f64 = 0.1;
const MAX_INTENTIONS: usize = 10;
const INTENTIONS_PER_EXECUTION: usize = 3;
const INITIAL_TRUST: f64 = 0.7;
const TRUST_GAIN: f64 = 0.1;
const TRUST_CEILING: f64 = 0.95;
/// Trust at or above this is left alone by learning.
const TRUST_SATURATION: f64 = 0.9;
const BUSY_THRESHOLD: usize = 3;
const ACTIVATION_GAIN: f64 = 0.1;
const ACTIVATION_DECAY: f64 = 0.05;
const ACTIVATION_FLOOR: f64 = 0.1;

const COLLABORATED_PREFIX: &str = "collaborated_with_";

/// Runs the processor for `state.phase` and returns the advanced state.
pub fn run_phase(state: &CognitiveState, graph: &AtomGraph) -> Result<CognitiveState> {
    let mut next = state.clone();
    let outcome = match state.phase {
        CognitivePhase::Perception => perceive(&mut next, graph),
        CognitivePhase::Attention => attend(&mut next, graph),
        CognitivePhase::Reasoning => reason(&mut next, graph),
        CognitivePhase::Planning => plan(&mut next),
        CognitivePhase::Execution => execute(&mut next, graph),
        CognitivePhase::Learning => learn(&mut next, graph),
        CognitivePhase::Reflection => reflect(&mut next),
    };
    outcome.map_err(|e| {
        Error::processing_failure(state.agent_id.clone(), state.phase.as_str(), e.to_string())
    })?;

    next.phase = state.phase.next();
    next.steps += 1;
    next.updated_at = Utc::now();
    Ok(next)
}

fn own_node(state: &CognitiveState, graph: &AtomGraph) -> Option<Atom> {
    graph.find_agent(state.name())
}

fn perceive(state: &mut CognitiveState, graph: &AtomGraph) -> Result<()> {
    let visible: Vec<Value> = graph
        .get_agents()
        .iter()
        .filter(|a| a.name() != state.name())
        .map(|a| Value::from(a.name()))
        .collect();
    state.beliefs.insert("visible_agents".into(), Value::Array(visible));

    let since = Utc::now() - Duration::seconds(RECENT_WINDOW_SECS);
    let recent = graph.count_created_since(since);
    state.beliefs.insert("recent_changes".into(), Value::from(recent));

    state.stamp("last_perception");
    Ok(())
}

fn attend(state: &mut CognitiveState, graph: &AtomGraph) -> Result<()> {
    state.attention_focus = graph
        .get_most_important_atoms(FOCUS_LIMIT)
        .iter()
        .map(|a| a.id())
        .collect();

    for goal in state.goals.clone() {
        for atom in graph.find_atoms(None, Some(&goal)).iter().take(GOAL_ATOMS_PER_GOAL) {
            state.focus_on(atom.id());
            graph.update_attention(&atom.id(), GOAL_STI_BOOST, 0.0, 0.0)?;
        }
    }
    Ok(())
}

fn reason(state: &mut CognitiveState, graph: &AtomGraph) -> Result<()> {
    if let Some(me) = own_node(state, graph) {
        let collaborators = graph.get_collaborators(&me.id());

        let names = collaborators.iter().map(|c| Value::from(c.name())).collect();
        state
            .beliefs
            .insert("potential_collaborators".into(), Value::Array(names));

        let mut trust = Map::new();
        for collab in &collaborators {
            if let Some(level) = graph.get_trust_level(&me.id(), &collab.id()) {
                trust.insert(collab.name().to_string(), Value::from(level));
            }
        }
        state.beliefs.insert("trust_levels".into(), Value::Object(trust));
    }

    state.stamp("last_reasoning");
    Ok(())
}

/// Decomposes goals into intentions. Infallible; it never touches the graph.
fn plan(state: &mut CognitiveState) -> Result<()> {
    let mut planned = Vec::new();
    for goal in &state.goals {
        if state.intentions.contains(goal) {
            continue;
        }
        let lower = goal.to_lowercase();
        if lower.contains("collaborate") {
            planned.push(format!("find_collaborator_for_{}", goal));
            planned.push(format!("establish_trust_for_{}", goal));
            planned.push(format!("coordinate_action_for_{}", goal));
        } else if lower.contains("learn") {
            planned.push(format!("gather_information_for_{}", goal));
            planned.push(format!("process_knowledge_for_{}", goal));
            planned.push(format!("validate_learning_for_{}", goal));
        } else {
            planned.push(format!("execute_{}", goal));
        }
    }

    state.intentions.extend(planned);
    state.intentions.truncate(MAX_INTENTIONS);
    state.stamp("last_planning");
    Ok(())
}

fn execute(state: &mut CognitiveState, graph: &AtomGraph) -> Result<()> {
    let batch: Vec<String> = state
        .intentions
        .iter()
        .take(INTENTIONS_PER_EXECUTION)
        .cloned()
        .collect();

    let mut executed = Vec::new();
    for intention in batch {
        let done = if intention.contains("find_collaborator") {
            find_collaborator(state, graph)?
        } else if intention.contains("establish_trust") {
            establish_trust(state, graph)?
        } else {
            state.stamp(format!("executed_{}", intention));
            true
        };
        if done {
            executed.push(intention);
        }
    }

    state.intentions.retain(|i| !executed.contains(i));
    state.stamp("last_execution");
    Ok(())
}

/// Links this agent to the first other agent node. False if there is none.
fn find_collaborator(state: &mut CognitiveState, graph: &AtomGraph) -> Result<bool> {
    let Some(me) = own_node(state, graph) else {
        return Ok(false);
    };
    let Some(partner) = graph.get_agents().into_iter().find(|a| a.id() != me.id()) else {
        return Ok(false);
    };

    graph.add_collaboration_link(&me.id(), &partner.id(), "cognitive_task")?;
    state
        .beliefs
        .insert(format!("{}{}", COLLABORATED_PREFIX, partner.name()), Value::Bool(true));
    Ok(true)
}

/// Trusts every collaborator that has no trust link yet. True if any was added.
fn establish_trust(state: &CognitiveState, graph: &AtomGraph) -> Result<bool> {
    let Some(me) = own_node(state, graph) else {
        return Ok(false);
    };
    let mut added = false;
    for collab in graph.get_collaborators(&me.id()) {
        if graph.get_trust_level(&me.id(), &collab.id()).is_none() {
            graph.add_trust_relationship(&me.id(), &collab.id(), INITIAL_TRUST)?;
            added = true;
        }
    }
    Ok(added)
}

fn learn(state: &mut CognitiveState, graph: &AtomGraph) -> Result<()> {
    let partners: Vec<String> = state
        .beliefs
        .iter()
        .filter(|(_, v)| **v == Value::Bool(true))
        .filter_map(|(k, _)| k.strip_prefix(COLLABORATED_PREFIX))
        .map(str::to_string)
        .collect();

    let me = own_node(state, graph);
    for partner in partners {
        let memory = Atom::memory(format!("collaboration_memory_{}", partner))
            .with_metadata("type", "collaboration")
            .with_metadata("partner", partner.as_str())
            .with_metadata("timestamp", unix_now())
            .with_metadata("outcome", "positive");
        graph.add_atom(memory)?;

        let (Some(me), Some(other)) = (me.as_ref(), graph.find_agent(&partner)) else {
            continue;
        };
        let Some(link) = graph.get_trust_link(&me.id(), &other.id()) else {
            continue;
        };
        let current = link.truth_value().strength();
        if current < TRUST_SATURATION {
            let raised = (current + TRUST_GAIN).min(TRUST_CEILING);
            graph.set_truth_value(&link.id(), link.truth_value().with_strength(raised))?;
        }
    }

    state.stamp("last_learning");
    Ok(())
}

/// Drops achieved goals and adapts activation. Infallible.
fn reflect(state: &mut CognitiveState) -> Result<()> {
    let keys: Vec<String> = state.beliefs.keys().map(|k| k.to_lowercase()).collect();
    state
        .goals
        .retain(|goal| !keys.iter().any(|k| k.contains(&goal.to_lowercase())));

    let now = unix_now();
    let recent = state
        .working_memory
        .iter()
        .filter(|(k, _)| k.starts_with("last_"))
        .filter_map(|(_, v)| v.as_f64())
        .filter(|t| now - t < RECENT_WINDOW_SECS as f64)
        .count();

    let activation = if recent > BUSY_THRESHOLD {
        (state.activation_level + ACTIVATION_GAIN).min(1.0)
    } else {
        (state.activation_level - ACTIVATION_DECAY).max(ACTIVATION_FLOOR)
    };
    state.set_activation(activation);

    state.stamp("last_reflection");
    Ok(())
}
