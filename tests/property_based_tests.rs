mod common;

use airavata_core::monitor::{map_fork_state, map_pbs_state, map_provider_code, map_slurm_state, map_state};
use airavata_core::state_machine::{
    ExperimentTransitionGuard, JobState, JobStateValidator, ProcessState, ProcessTransitionGuard,
};
use common::strategies::*;
use proptest::prelude::*;

proptest! {
    /// Property: every mapping function accepts any input without panicking
    #[test]
    fn status_mappings_are_total(code in status_code_strategy(), manager in job_manager_strategy()) {
        let _ = map_pbs_state(&code);
        let _ = map_slurm_state(&code);
        let _ = map_fork_state(&code);
        let _ = map_provider_code(&code);
        let _ = map_state(manager, &code);
    }

    /// Property: text that is not a `STATUS_*` code is UNKNOWN to the provider mapping
    #[test]
    fn unrecognised_provider_codes_are_unknown(code in status_code_strategy()) {
        prop_assume!(!code.trim().to_ascii_uppercase().starts_with("STATUS_"));
        prop_assert_eq!(map_provider_code(&code), JobState::Unknown);
    }

    /// Property: known provider codes map regardless of case and padding
    #[test]
    fn provider_codes_map_for_every_manager(
        (code, expected) in provider_code_strategy(),
        manager in job_manager_strategy(),
    ) {
        prop_assert_eq!(map_provider_code(&code), expected);
        if code.trim_start().starts_with("STATUS_") {
            prop_assert_eq!(map_state(manager, &code), expected);
        }
    }

    /// Property: once a process is terminal its state never changes, and
    /// outside the cancel and failure branches it only moves forward
    #[test]
    fn process_guard_is_monotonic(writes in status_writes_strategy(process_state_strategy())) {
        let mut current: Option<ProcessState> = None;
        for next in writes {
            let applied = ProcessTransitionGuard::evaluate(current, next).is_apply();
            if let Some(state) = current {
                if state.is_terminal() {
                    prop_assert!(!applied, "{} overwrote terminal {}", next, state);
                }
                if state == ProcessState::Cancelling && applied {
                    prop_assert!(matches!(next, ProcessState::Canceled | ProcessState::Failed));
                }
                if applied {
                    if let (Some(from), Some(to)) = (state.rank(), next.rank()) {
                        prop_assert!(to > from, "{} -> {} moved backwards", state, next);
                    }
                }
            }
            if applied {
                current = Some(next);
            }
        }
    }

    /// Property: experiment terminal states are final
    #[test]
    fn experiment_guard_keeps_terminal_states(writes in status_writes_strategy(experiment_state_strategy())) {
        let mut current = None;
        for next in writes {
            let applied = ExperimentTransitionGuard::evaluate(current, next).is_apply();
            if let Some(state) = current {
                prop_assert!(!(state.is_terminal() && applied));
            }
            if applied {
                current = Some(next);
            }
        }
    }

    /// Property: job histories never leave a terminal state or return to SUBMITTED
    #[test]
    fn job_history_validator_is_monotonic(writes in status_writes_strategy(job_state_strategy())) {
        let mut history: Vec<JobState> = Vec::new();
        for next in writes {
            if JobStateValidator::is_valid(history.last().copied(), next) {
                history.push(next);
            }
        }
        if let Some(position) = history.iter().position(JobState::is_terminal) {
            prop_assert_eq!(position, history.len() - 1);
        }
        prop_assert!(history.iter().skip(1).all(|state| *state != JobState::Submitted));
    }
}
