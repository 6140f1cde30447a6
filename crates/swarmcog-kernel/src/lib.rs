//! swarmcog-kernel — cognitive state machine and scheduler
//!
//! Every registered agent walks the seven-phase ring against the shared
//! [`AtomGraph`](swarmcog_graph::AtomGraph), either one step at a time or in
//! a cancellable background cycle.

pub mod phases;
pub mod scheduler;
pub mod state;

pub use phases::run_phase;
pub use scheduler::{Scheduler, SchedulerStats, SystemSnapshot};
pub use state::{CognitivePhase, CognitiveState};
