//! Proptest strategies for lifecycle states and provider status codes.

use airavata_core::models::JobManagerType;
use airavata_core::state_machine::{ExperimentState, JobState, ProcessState};
use proptest::prelude::*;

pub fn process_state_strategy() -> impl Strategy<Value = ProcessState> {
    prop::sample::select(ProcessState::all().to_vec())
}

pub fn job_state_strategy() -> impl Strategy<Value = JobState> {
    prop::sample::select(JobState::all().to_vec())
}

pub fn experiment_state_strategy() -> impl Strategy<Value = ExperimentState> {
    prop::sample::select(vec![
        ExperimentState::Created,
        ExperimentState::Validated,
        ExperimentState::Scheduled,
        ExperimentState::Launched,
        ExperimentState::Executing,
        ExperimentState::Canceling,
        ExperimentState::Canceled,
        ExperimentState::Completed,
        ExperimentState::Failed,
    ])
}

pub fn job_manager_strategy() -> impl Strategy<Value = JobManagerType> {
    prop::sample::select(vec![JobManagerType::Pbs, JobManagerType::Slurm, JobManagerType::Fork])
}

/// Sequences of proposed status writes, as concurrent writers would issue them
pub fn status_writes_strategy<S: Strategy>(states: S) -> impl Strategy<Value = Vec<S::Value>>
where
    S::Value: Clone,
{
    prop::collection::vec(states, 0..24)
}

/// Free-form text a resource manager might print
pub fn status_code_strategy() -> impl Strategy<Value = String> {
    "[ -~]{0,24}"
}

/// A known `STATUS_*` code with random case and surrounding whitespace
pub fn provider_code_strategy() -> impl Strategy<Value = (String, JobState)> {
    let codes = prop::sample::select(vec![
        ("STATUS_DONE", JobState::Complete),
        ("STATUS_FAILED", JobState::Failed),
        ("STATUS_ACTIVE", JobState::Active),
        ("STATUS_PENDING", JobState::Queued),
        ("STATUS_UNSUBMITTED", JobState::Queued),
        ("STATUS_SUSPENDED", JobState::Suspended),
    ]);
    (codes, any::<bool>(), " {0,2}", " {0,2}").prop_map(|((code, state), lower, before, after)| {
        let code = if lower { code.to_ascii_lowercase() } else { code.to_string() };
        (format!("{before}{code}{after}"), state)
    })
}
