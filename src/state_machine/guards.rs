use super::errors::{business_rule_violation, GuardResult};
use super::states::{ExperimentState, JobState, ProcessState};
use serde::{Deserialize, Serialize};

/// Outcome of checking a proposed status write against the current state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionDecision {
    /// The write moves the entity forward and must be stored
    Apply,
    /// The entity is already in the requested state
    Duplicate,
    /// The write would regress or leave a terminal state
    Rejected { reason: String },
}

impl TransitionDecision {
    pub fn is_apply(&self) -> bool {
        matches!(self, Self::Apply)
    }

    pub fn into_guard_result(self) -> GuardResult<bool> {
        match self {
            Self::Apply => Ok(true),
            Self::Duplicate => Ok(false),
            Self::Rejected { reason } => Err(business_rule_violation(reason)),
        }
    }

    fn rejected(reason: String) -> Self {
        Self::Rejected { reason }
    }
}

/// Monotonic guard for process status writes
///
/// Processes only advance along the forward path. The exceptions are the
/// exit branches: any live process may fail, any live process may start
/// cancelling or be cancelled, and a cancelling process may only finish as
/// canceled or failed.
#[derive(Debug)]
pub struct ProcessTransitionGuard;

impl ProcessTransitionGuard {
    pub fn evaluate(current: Option<ProcessState>, next: ProcessState) -> TransitionDecision {
        use ProcessState::*;

        let Some(current) = current else {
            return TransitionDecision::Apply;
        };

        if current == next {
            return TransitionDecision::Duplicate;
        }

        if current.is_terminal() {
            return TransitionDecision::rejected(format!(
                "Cannot transition from terminal state {current} to {next}"
            ));
        }

        match (current, next) {
            (_, Failed) => TransitionDecision::Apply,
            (Cancelling, Canceled) => TransitionDecision::Apply,
            (Cancelling, _) => TransitionDecision::rejected(format!(
                "Process is cancelling, {next} is not allowed"
            )),
            (_, Cancelling) | (_, Canceled) => TransitionDecision::Apply,
            (from, to) => match (from.rank(), to.rank()) {
                (Some(a), Some(b)) if b > a => TransitionDecision::Apply,
                _ => TransitionDecision::rejected(format!(
                    "Process state may not move backwards from {from} to {to}"
                )),
            },
        }
    }

    pub fn can_transition(current: Option<ProcessState>, next: ProcessState) -> GuardResult<bool> {
        Self::evaluate(current, next).into_guard_result()
    }
}

/// Guard for experiment status writes
#[derive(Debug)]
pub struct ExperimentTransitionGuard;

impl ExperimentTransitionGuard {
    pub fn evaluate(current: Option<ExperimentState>, next: ExperimentState) -> TransitionDecision {
        let Some(current) = current else {
            return TransitionDecision::Apply;
        };
        if current == next {
            return TransitionDecision::Duplicate;
        }
        if current.is_terminal() {
            return TransitionDecision::rejected(format!(
                "Cannot transition experiment from terminal state {current} to {next}"
            ));
        }
        if current == ExperimentState::Canceling
            && !matches!(next, ExperimentState::Canceled | ExperimentState::Failed)
        {
            return TransitionDecision::rejected(format!(
                "Experiment is canceling, {next} is not allowed"
            ));
        }
        TransitionDecision::Apply
    }
}

/// Validates job status history appends
#[derive(Debug)]
pub struct JobStateValidator;

impl JobStateValidator {
    pub fn evaluate(current: Option<JobState>, next: JobState) -> TransitionDecision {
        let Some(current) = current else {
            return TransitionDecision::Apply;
        };
        if current == next {
            return TransitionDecision::Duplicate;
        }
        if current.is_terminal() {
            return TransitionDecision::rejected(format!(
                "Job already reached terminal state {current}, ignoring {next}"
            ));
        }
        if next == JobState::Submitted {
            return TransitionDecision::rejected(format!(
                "Job in state {current} cannot return to submitted"
            ));
        }
        TransitionDecision::Apply
    }

    /// Returns true when `next` may be appended after `current`
    pub fn is_valid(current: Option<JobState>, next: JobState) -> bool {
        Self::evaluate(current, next).is_apply()
    }
}
