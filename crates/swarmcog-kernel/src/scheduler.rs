//! Scheduler — the agent registry and the per-agent cycle driver.
//!
//! Lock order: admission → registry shard → agent state → graph.
//! No path takes the registry while holding an agent state.

use crate::phases::run_phase;
use crate::state::CognitiveState;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use swarmcog_core::{AgentId, Error, Result, SchedulerConfig, SwarmConfig};
use swarmcog_graph::{AtomGraph, GraphSnapshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type StateCell = Arc<Mutex<CognitiveState>>;
type Registry = DashMap<AgentId, StateCell>;

/// A running cycle: its cancel switch and its task.
struct CycleHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl CycleHandle {
    fn is_live(&self) -> bool {
        !self.join.is_finished()
    }
}

/// Phase outcomes since construction or the last reset. Shared with every
/// running cycle.
struct ProcessingCounters {
    completed: AtomicU64,
    failed: AtomicU64,
    busy_micros: AtomicU64,
    since: Mutex<DateTime<Utc>>,
}

impl ProcessingCounters {
    fn new() -> Self {
        Self {
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            busy_micros: AtomicU64::new(0),
            since: Mutex::new(Utc::now()),
        }
    }

    fn record(&self, ok: bool, elapsed: Duration) {
        let counter = if ok { &self.completed } else { &self.failed };
        counter.fetch_add(1, Ordering::Relaxed);
        self.busy_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    fn reset(&self) {
        self.completed.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.busy_micros.store(0, Ordering::Relaxed);
        *self.since.lock() = Utc::now();
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStats {
    pub registered_agents: usize,
    pub running_cycles: usize,
    pub max_agents: usize,
    pub cycle_interval_ms: u64,
    /// Phases applied successfully.
    pub phases_completed: u64,
    /// Phases that ended in `ProcessingFailure`.
    pub phases_failed: u64,
    /// Wall time spent inside phase processors.
    pub processing_time_ms: f64,
    pub stats_since: DateTime<Utc>,
}

/// Serializable view of the whole system.
#[derive(Debug, Clone, Serialize)]
pub struct SystemSnapshot {
    pub scheduler: SchedulerStats,
    pub graph: GraphSnapshot,
    pub agent_states: BTreeMap<AgentId, CognitiveState>,
}

pub struct Scheduler {
    graph: Arc<AtomGraph>,
    config: SchedulerConfig,
    agents: Arc<Registry>,
    cycles: Mutex<HashMap<AgentId, CycleHandle>>,
    counters: Arc<ProcessingCounters>,
    /// Serializes registrations so the capacity check cannot race.
    admission: Mutex<()>,
}

impl Scheduler {
    pub fn new(graph: Arc<AtomGraph>, config: SchedulerConfig) -> Self {
        Self {
            graph,
            config,
            agents: Arc::new(DashMap::new()),
            cycles: Mutex::new(HashMap::new()),
            counters: Arc::new(ProcessingCounters::new()),
            admission: Mutex::new(()),
        }
    }

    /// Builds the graph and the scheduler from one config.
    pub fn from_config(config: &SwarmConfig) -> Self {
        let graph = Arc::new(AtomGraph::from_config(&config.graph));
        Self::new(graph, config.scheduler.clone())
    }

    pub fn graph(&self) -> &Arc<AtomGraph> {
        &self.graph
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    // ── Registry ──────────────────────────────────────────

    /// Registers an agent at Perception and makes sure an agent node with
    /// its name exists. An already registered id returns its current state.
    pub fn register(
        &self,
        agent_id: impl Into<AgentId>,
        goals: Vec<String>,
        beliefs: BTreeMap<String, Value>,
    ) -> Result<CognitiveState> {
        let agent_id = agent_id.into();
        let _admission = self.admission.lock();

        if let Some(existing) = self.cell(&agent_id) {
            warn!("Agent {} already registered; keeping existing state", agent_id);
            return Ok(existing.lock().clone());
        }
        if self.agents.len() >= self.config.max_agents {
            return Err(Error::CapacityExceeded(format!(
                "scheduler already holds {} agents",
                self.config.max_agents
            )));
        }

        if self.graph.find_agent(agent_id.as_str()).is_none() {
            self.graph.add_agent_node::<&str>(agent_id.as_str(), &[])?;
        }

        let state = CognitiveState::new(agent_id.clone(), goals, beliefs);
        self.agents
            .insert(agent_id.clone(), Arc::new(Mutex::new(state.clone())));
        info!("Registered cognitive agent: {}", agent_id);
        Ok(state)
    }

    /// Removes an agent, cancelling and awaiting its cycle if one runs.
    pub async fn deregister(&self, agent_id: &AgentId) -> Result<CognitiveState> {
        let (_, cell) = self
            .agents
            .remove(agent_id)
            .ok_or_else(|| Error::AgentNotFound(agent_id.clone()))?;

        let handle = self.cycles.lock().remove(agent_id);
        if let Some(handle) = handle {
            handle.cancel.cancel();
            if let Err(e) = handle.join.await {
                error!("Cycle for {} ended abnormally: {}", agent_id, e);
            }
        }

        info!("Deregistered cognitive agent: {}", agent_id);
        let state = cell.lock().clone();
        Ok(state)
    }

    pub fn get_state(&self, agent_id: &AgentId) -> Result<CognitiveState> {
        self.cell(agent_id)
            .map(|cell| cell.lock().clone())
            .ok_or_else(|| Error::AgentNotFound(agent_id.clone()))
    }

    pub fn is_registered(&self, agent_id: &AgentId) -> bool {
        self.agents.contains_key(agent_id)
    }

    /// Registered ids, sorted.
    pub fn agent_ids(&self) -> Vec<AgentId> {
        let mut ids: Vec<AgentId> = self.agents.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Appends goals the agent does not already hold.
    pub fn update_goals(&self, agent_id: &AgentId, goals: Vec<String>) -> Result<CognitiveState> {
        let cell = self
            .cell(agent_id)
            .ok_or_else(|| Error::AgentNotFound(agent_id.clone()))?;
        let mut state = cell.lock();
        state.merge_goals(goals);
        info!("Updated goals for agent {}: {:?}", agent_id, state.goals);
        Ok(state.clone())
    }

    /// Overwrites beliefs key by key.
    pub fn update_beliefs(
        &self,
        agent_id: &AgentId,
        beliefs: BTreeMap<String, Value>,
    ) -> Result<CognitiveState> {
        let cell = self
            .cell(agent_id)
            .ok_or_else(|| Error::AgentNotFound(agent_id.clone()))?;
        let mut state = cell.lock();
        state.merge_beliefs(beliefs);
        info!("Updated beliefs for agent {}", agent_id);
        Ok(state.clone())
    }

    fn cell(&self, agent_id: &AgentId) -> Option<StateCell> {
        self.agents.get(agent_id).map(|e| e.value().clone())
    }

    // ── Execution ─────────────────────────────────────────

    /// Runs exactly one phase for the agent.
    pub fn process_one(&self, agent_id: &AgentId) -> Result<CognitiveState> {
        step(&self.agents, &self.graph, &self.counters, agent_id)
    }

    /// Spawns a cycle for every registered agent that lacks a live one.
    /// Agents registered later are not enrolled. Returns how many were spawned.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime, since cycles are spawned
    /// onto the current one.
    pub fn start_all(&self, interval: Duration) -> usize {
        let mut cycles = self.cycles.lock();
        let mut spawned = 0;

        for agent_id in self.agent_ids() {
            if cycles.get(&agent_id).is_some_and(CycleHandle::is_live) {
                continue;
            }
            let cancel = CancellationToken::new();
            let join = tokio::spawn(run_cycle(
                self.agents.clone(),
                self.graph.clone(),
                self.counters.clone(),
                agent_id.clone(),
                interval,
                cancel.clone(),
            ));
            cycles.insert(agent_id, CycleHandle { cancel, join });
            spawned += 1;
        }

        info!(
            "Started cognitive cycles for {} agents ({} running, every {:?})",
            spawned,
            cycles.len(),
            interval
        );
        spawned
    }

    /// Cancels every cycle and waits for all of them to finish.
    pub async fn stop_all(&self) -> usize {
        let handles: Vec<(AgentId, CycleHandle)> = self.cycles.lock().drain().collect();
        for (_, handle) in &handles {
            handle.cancel.cancel();
        }

        let count = handles.len();
        let (ids, joins): (Vec<AgentId>, Vec<JoinHandle<()>>) =
            handles.into_iter().map(|(id, h)| (id, h.join)).unzip();
        for (agent_id, result) in ids.iter().zip(futures::future::join_all(joins).await) {
            if let Err(e) = result {
                error!("Cycle for {} ended abnormally: {}", agent_id, e);
            }
        }

        info!("Stopped {} cognitive cycles", count);
        count
    }

    pub fn is_running(&self, agent_id: &AgentId) -> bool {
        self.cycles
            .lock()
            .get(agent_id)
            .is_some_and(CycleHandle::is_live)
    }

    pub fn running_count(&self) -> usize {
        self.cycles.lock().values().filter(|h| h.is_live()).count()
    }

    // ── Introspection ─────────────────────────────────────

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            registered_agents: self.agents.len(),
            running_cycles: self.running_count(),
            max_agents: self.config.max_agents,
            cycle_interval_ms: self.config.cycle_interval_ms,
            phases_completed: self.counters.completed.load(Ordering::Relaxed),
            phases_failed: self.counters.failed.load(Ordering::Relaxed),
            processing_time_ms: self.counters.busy_micros.load(Ordering::Relaxed) as f64
                / 1_000.0,
            stats_since: *self.counters.since.lock(),
        }
    }

    /// Zeroes the processing counters and restarts their clock.
    pub fn reset_stats(&self) {
        self.counters.reset();
        info!("Reset scheduler processing statistics");
    }

    pub fn snapshot(&self) -> SystemSnapshot {
        let agent_states = self
            .agents
            .iter()
            .map(|e| (e.key().clone(), e.value().lock().clone()))
            .collect();
        SystemSnapshot {
            scheduler: self.stats(),
            graph: self.graph.snapshot(),
            agent_states,
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for handle in self.cycles.get_mut().values() {
            handle.cancel.cancel();
        }
    }
}

/// One phase under the agent's state lock. The registry guard is released
/// before the state lock is taken.
/// Unknown agents are not counted.
fn step(
    agents: &Registry,
    graph: &AtomGraph,
    counters: &ProcessingCounters,
    agent_id: &AgentId,
) -> Result<CognitiveState> {
    let cell = agents
        .get(agent_id)
        .map(|e| e.value().clone())
        .ok_or_else(|| Error::AgentNotFound(agent_id.clone()))?;

    let mut state = cell.lock();
    let started = Instant::now();
    let outcome = run_phase(&state, graph);
    counters.record(outcome.is_ok(), started.elapsed());
    let next = outcome?;
    debug!("Processed {} for agent {}", state.phase, agent_id);
    *state = next.clone();
    Ok(next)
}

async fn run_cycle(
    agents: Arc<Registry>,
    graph: Arc<AtomGraph>,
    counters: Arc<ProcessingCounters>,
    agent_id: AgentId,
    interval: Duration,
    cancel: CancellationToken,
) {
    info!("Starting continuous cognitive cycle for agent {}", agent_id);

    while !cancel.is_cancelled() {
        match step(&agents, &graph, &counters, &agent_id) {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                info!("Agent {} no longer registered; cycle exits", agent_id);
                break;
            }
            Err(e) => warn!("{}; retrying next tick", e),
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    info!("Cognitive cycle stopped for agent {}", agent_id);
}
