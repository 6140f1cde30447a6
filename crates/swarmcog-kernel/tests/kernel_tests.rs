//! Integration tests for the scheduler and the cognitive cycle

use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use swarmcog_core::{AgentId, Error, SchedulerConfig};
use swarmcog_graph::{AtomGraph, AtomType};
use swarmcog_kernel::*;

fn scheduler_with(graph: AtomGraph) -> Scheduler {
    Scheduler::new(Arc::new(graph), SchedulerConfig::default())
}

fn scheduler() -> Scheduler {
    scheduler_with(AtomGraph::new("test_space"))
}

fn id(name: &str) -> AgentId {
    AgentId::new(name)
}

// ===========================================================================
// Registry
// ===========================================================================

#[test]
fn register_starts_at_perception_with_agent_node() {
    let s = scheduler();
    let state = s
        .register("alice", vec!["ship it".into()], BTreeMap::new())
        .unwrap();
    assert_eq!(state.phase, CognitivePhase::Perception);
    assert_eq!(state.goals, vec!["ship it"]);
    assert_eq!(state.activation_level, 1.0);

    let node = s.graph().find_agent("alice").unwrap();
    assert_eq!(node.atom_type(), AtomType::AgentNode);
    assert!(s.is_registered(&id("alice")));
}

#[test]
fn register_existing_returns_current_state() {
    let s = scheduler();
    s.register("alice", vec!["g1".into()], BTreeMap::new()).unwrap();
    s.process_one(&id("alice")).unwrap();

    let again = s
        .register("alice", vec!["g2".into()], BTreeMap::new())
        .unwrap();
    assert_eq!(again.phase, CognitivePhase::Attention);
    assert_eq!(again.goals, vec!["g1"]);
    assert_eq!(s.len(), 1);
    assert_eq!(s.graph().get_agents().len(), 1);
}

#[test]
fn unknown_agent_is_not_found() {
    let s = scheduler();
    let ghost = id("ghost");
    assert!(matches!(s.get_state(&ghost), Err(Error::AgentNotFound(_))));
    assert!(matches!(s.process_one(&ghost), Err(Error::AgentNotFound(_))));
    assert!(s.update_goals(&ghost, vec!["x".into()]).is_err());
    assert!(s.update_beliefs(&ghost, BTreeMap::new()).is_err());
}

#[test]
fn update_goals_appends_missing_only() {
    let s = scheduler();
    s.register("alice", vec!["a".into()], BTreeMap::new()).unwrap();
    let state = s
        .update_goals(&id("alice"), vec!["a".into(), "b".into()])
        .unwrap();
    assert_eq!(state.goals, vec!["a", "b"]);
}

#[test]
fn update_beliefs_overwrites_by_key() {
    let s = scheduler();
    let beliefs = BTreeMap::from([("mood".to_string(), json!("calm")), ("n".to_string(), json!(1))]);
    s.register("alice", vec![], beliefs).unwrap();

    let state = s
        .update_beliefs(&id("alice"), BTreeMap::from([("n".to_string(), json!(2))]))
        .unwrap();
    assert_eq!(state.beliefs["mood"], json!("calm"));
    assert_eq!(state.beliefs["n"], json!(2));
}

#[test]
fn agent_ids_are_sorted() {
    let s = scheduler();
    for name in ["carol", "alice", "bob"] {
        s.register(name, vec![], BTreeMap::new()).unwrap();
    }
    assert_eq!(s.agent_ids(), vec![id("alice"), id("bob"), id("carol")]);
}

// ===========================================================================
// Single-step processing
// ===========================================================================

#[test]
fn seven_steps_visit_the_ring_in_order() {
    let s = scheduler();
    s.register("alice", vec!["collaborate with anyone".into(), "learn rust".into()], BTreeMap::new())
        .unwrap();
    s.register("bob", vec![], BTreeMap::new()).unwrap();

    let mut visited = Vec::new();
    for _ in 0..7 {
        visited.push(s.get_state(&id("alice")).unwrap().phase);
        s.process_one(&id("alice")).unwrap();
    }
    assert_eq!(visited, CognitivePhase::RING.to_vec());

    let state = s.get_state(&id("alice")).unwrap();
    assert_eq!(state.phase, CognitivePhase::Perception);
    assert_eq!(state.steps, 7);
}

#[test]
fn one_cycle_builds_collaboration_and_trust() {
    let s = scheduler();
    s.register("alice", vec!["collaborate with bob".into()], BTreeMap::new())
        .unwrap();
    s.register("bob", vec![], BTreeMap::new()).unwrap();

    for _ in 0..7 {
        s.process_one(&id("alice")).unwrap();
    }

    let graph = s.graph();
    let alice = graph.find_agent("alice").unwrap();
    let bob = graph.find_agent("bob").unwrap();

    let collaborators = graph.get_collaborators(&alice.id());
    assert_eq!(collaborators.len(), 1);
    assert_eq!(collaborators[0].id(), bob.id());

    let trust = graph.get_trust_level(&alice.id(), &bob.id()).unwrap();
    assert!((trust - 0.8).abs() < 1e-9);
    assert!(graph.get_trust_level(&bob.id(), &alice.id()).is_none());

    let memories = graph.find_atoms(Some(AtomType::MemoryNode), Some("collaboration_memory_bob"));
    assert_eq!(memories.len(), 1);

    let state = s.get_state(&id("alice")).unwrap();
    assert_eq!(state.beliefs["collaborated_with_bob"], json!(true));
    assert!(state.intentions.is_empty());
    for key in [
        "last_perception",
        "last_reasoning",
        "last_planning",
        "last_execution",
        "last_learning",
        "last_reflection",
    ] {
        assert!(state.working_memory.contains_key(key), "missing {}", key);
    }
}

#[test]
fn processing_failure_leaves_state_unchanged() {
    let s = scheduler_with(AtomGraph::new("tiny").with_max_atoms(Some(2)));
    s.register("alice", vec![], BTreeMap::new()).unwrap();
    s.register("bob", vec![], BTreeMap::new()).unwrap();
    s.update_beliefs(
        &id("alice"),
        BTreeMap::from([("collaborated_with_bob".to_string(), json!(true))]),
    )
    .unwrap();

    for _ in 0..5 {
        s.process_one(&id("alice")).unwrap();
    }
    let before = s.get_state(&id("alice")).unwrap();
    assert_eq!(before.phase, CognitivePhase::Learning);

    let err = s.process_one(&id("alice")).unwrap_err();
    match err {
        Error::ProcessingFailure { agent, phase, .. } => {
            assert_eq!(agent, id("alice"));
            assert_eq!(phase, "learning");
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(s.get_state(&id("alice")).unwrap(), before);
}

#[test]
fn failed_phases_are_counted_apart_from_completed() {
    let s = scheduler_with(AtomGraph::new("tiny").with_max_atoms(Some(2)));
    s.register("alice", vec![], BTreeMap::new()).unwrap();
    s.register("bob", vec![], BTreeMap::new()).unwrap();
    s.update_beliefs(
        &id("alice"),
        BTreeMap::from([("collaborated_with_bob".to_string(), json!(true))]),
    )
    .unwrap();

    for _ in 0..5 {
        s.process_one(&id("alice")).unwrap();
    }
    for _ in 0..3 {
        assert!(s.process_one(&id("alice")).is_err());
    }
    assert!(s.process_one(&id("nobody")).is_err());

    let stats = s.stats();
    assert_eq!(stats.phases_completed, 5);
    assert_eq!(stats.phases_failed, 3);
    assert!(stats.processing_time_ms >= 0.0);

    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["phases_completed"], 5);
    assert_eq!(json["phases_failed"], 3);
    assert!(json["stats_since"].is_string());

    let started = stats.stats_since;
    s.reset_stats();
    let reset = s.stats();
    assert_eq!(reset.phases_completed, 0);
    assert_eq!(reset.phases_failed, 0);
    assert_eq!(reset.processing_time_ms, 0.0);
    assert!(reset.stats_since >= started);
    assert_eq!(s.get_state(&id("alice")).unwrap().steps, 5);
}

#[test]
fn scheduler_capacity_from_config() {
    let config = SchedulerConfig {
        max_agents: 2,
        ..SchedulerConfig::default()
    };
    let s = Scheduler::new(Arc::new(AtomGraph::new("t")), config);
    s.register("a", vec![], BTreeMap::new()).unwrap();
    s.register("b", vec![], BTreeMap::new()).unwrap();
    assert!(matches!(
        s.register("c", vec![], BTreeMap::new()),
        Err(Error::CapacityExceeded(_))
    ));
    assert!(s.graph().find_agent("c").is_none());
}

// ===========================================================================
// Continuous cycles
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn start_all_advances_within_bounds() {
    let s = scheduler();
    s.register("alice", vec!["learn things".into()], BTreeMap::new())
        .unwrap();
    s.register("bob", vec![], BTreeMap::new()).unwrap();

    assert_eq!(s.start_all(Duration::from_millis(100)), 2);
    tokio::time::sleep(Duration::from_millis(1050)).await;
    assert_eq!(s.stop_all().await, 2);

    for name in ["alice", "bob"] {
        let steps = s.get_state(&id(name)).unwrap().steps;
        assert!((10..=12).contains(&steps), "{} took {} steps", name, steps);
    }
}

#[tokio::test(start_paused = true)]
async fn stop_all_waits_for_every_cycle() {
    let s = scheduler();
    for name in ["a", "b", "c"] {
        s.register(name, vec![], BTreeMap::new()).unwrap();
    }
    s.start_all(Duration::from_millis(50));
    assert_eq!(s.running_count(), 3);

    tokio::time::sleep(Duration::from_millis(120)).await;
    s.stop_all().await;
    assert_eq!(s.running_count(), 0);

    let frozen: Vec<u64> = s
        .agent_ids()
        .iter()
        .map(|a| s.get_state(a).unwrap().steps)
        .collect();
    tokio::time::sleep(Duration::from_millis(500)).await;
    let later: Vec<u64> = s
        .agent_ids()
        .iter()
        .map(|a| s.get_state(a).unwrap().steps)
        .collect();
    assert_eq!(frozen, later);
}

#[tokio::test(start_paused = true)]
async fn start_all_skips_live_cycles_and_late_agents() {
    let s = scheduler();
    s.register("alice", vec![], BTreeMap::new()).unwrap();
    assert_eq!(s.start_all(Duration::from_millis(10)), 1);
    assert_eq!(s.start_all(Duration::from_millis(10)), 0);

    s.register("late", vec![], BTreeMap::new()).unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(s.is_running(&id("alice")));
    assert!(!s.is_running(&id("late")));
    assert_eq!(s.get_state(&id("late")).unwrap().steps, 0);

    assert_eq!(s.start_all(Duration::from_millis(10)), 1);
    assert!(s.is_running(&id("late")));
    assert_eq!(s.stop_all().await, 2);
}

#[tokio::test(start_paused = true)]
async fn deregister_cancels_only_that_cycle() {
    let s = scheduler();
    s.register("alice", vec![], BTreeMap::new()).unwrap();
    s.register("bob", vec![], BTreeMap::new()).unwrap();
    s.start_all(Duration::from_millis(20));
    tokio::time::sleep(Duration::from_millis(50)).await;

    let removed = s.deregister(&id("alice")).await.unwrap();
    assert_eq!(removed.agent_id, id("alice"));
    assert!(!s.is_running(&id("alice")));
    assert!(matches!(s.get_state(&id("alice")), Err(Error::AgentNotFound(_))));
    assert!(s.is_running(&id("bob")));

    assert!(s.deregister(&id("alice")).await.unwrap_err().is_not_found());
    assert_eq!(s.stop_all().await, 1);
}

#[tokio::test(start_paused = true)]
async fn faulting_agent_keeps_cycling_without_harming_siblings() {
    let s = scheduler_with(AtomGraph::new("tiny").with_max_atoms(Some(2)));
    s.register("alice", vec![], BTreeMap::new()).unwrap();
    s.register("bob", vec![], BTreeMap::new()).unwrap();
    s.update_beliefs(
        &id("alice"),
        BTreeMap::from([("collaborated_with_bob".to_string(), json!(true))]),
    )
    .unwrap();

    s.start_all(Duration::from_millis(10));
    tokio::time::sleep(Duration::from_millis(205)).await;

    assert!(s.is_running(&id("alice")));
    assert!(s.is_running(&id("bob")));
    let alice = s.get_state(&id("alice")).unwrap();
    assert_eq!(alice.phase, CognitivePhase::Learning);
    assert_eq!(alice.steps, 5);
    assert!(s.get_state(&id("bob")).unwrap().steps >= 20);

    assert_eq!(s.stop_all().await, 2);
    let stats = s.stats();
    let bob_steps = s.get_state(&id("bob")).unwrap().steps;
    assert_eq!(stats.phases_completed, 5 + bob_steps);
    assert!(stats.phases_failed >= 15, "only {} failures", stats.phases_failed);
    assert_eq!(s.snapshot().scheduler.phases_failed, stats.phases_failed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_cycles_keep_graph_consistent() {
    let s = scheduler();
    for i in 0..12 {
        s.register(
            format!("agent_{}", i),
            vec![format!("collaborate on task {}", i), "learn".into()],
            BTreeMap::new(),
        )
        .unwrap();
    }
    s.start_all(Duration::from_millis(1));
    tokio::time::sleep(Duration::from_millis(200)).await;
    s.stop_all().await;

    let graph = s.graph();
    for atom in graph.find_atoms(None, None) {
        for target in atom.outgoing() {
            assert!(graph.contains(target));
            let incoming = graph.get_incoming(target);
            assert!(incoming.iter().any(|l| l.id() == atom.id()));
        }
    }
    let stats = graph.statistics();
    let typed: usize = stats.atom_types.values().sum();
    assert_eq!(typed, stats.total_atoms);
    assert!(!graph.find_atoms(Some(AtomType::CollaborationLink), None).is_empty());
}

// ===========================================================================
// Snapshot
// ===========================================================================

#[test]
fn snapshot_serializes_scheduler_graph_and_states() {
    let s = scheduler();
    s.register("alice", vec!["x".into()], BTreeMap::new()).unwrap();
    s.process_one(&id("alice")).unwrap();

    let snap = s.snapshot();
    assert_eq!(snap.scheduler.registered_agents, 1);
    assert_eq!(snap.scheduler.running_cycles, 0);
    assert_eq!(snap.scheduler.max_agents, 50);
    assert_eq!(snap.graph.atoms.len(), 1);

    let value = serde_json::to_value(&snap).unwrap();
    assert_eq!(value["agent_states"]["alice"]["phase"], "attention");
    assert_eq!(value["agent_states"]["alice"]["goals"], json!(["x"]));
    assert_eq!(value["graph"]["name"], "test_space");
}
