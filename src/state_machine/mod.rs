//! # State Machines
//!
//! Lifecycle states for experiments, processes, tasks and jobs, the guards
//! that keep status writes monotonic, and the state machines that pair a
//! guarded registry write with a status-change publish.

pub mod errors;
pub mod experiment_state_machine;
pub mod guards;
pub mod process_state_machine;
pub mod states;

pub use errors::{GuardError, GuardResult, StateMachineError, StateMachineResult};
pub use experiment_state_machine::ExperimentStateMachine;
pub use guards::{ExperimentTransitionGuard, JobStateValidator, ProcessTransitionGuard, TransitionDecision};
pub use process_state_machine::ProcessStateMachine;
pub use states::{ExperimentState, JobState, ProcessState, TaskState};
