//! Provider state codes to canonical job states.
//!
//! Every function here is total: unrecognised input maps to
//! [`JobState::Unknown`].

use crate::models::JobManagerType;
use crate::state_machine::JobState;

/// PBS / Torque single letter job states
pub fn map_pbs_state(code: &str) -> JobState {
    match code.trim() {
        "C" => JobState::Complete,
        "F" => JobState::Failed,
        "H" => JobState::Held,
        "Q" | "W" | "T" => JobState::Queued,
        // E is exiting: the job still holds its nodes and may yet fail.
        "R" | "E" | "B" | "X" => JobState::Active,
        "S" | "U" => JobState::Suspended,
        _ => JobState::Unknown,
    }
}

/// SLURM short (`R`) or long (`RUNNING`) job states
pub fn map_slurm_state(code: &str) -> JobState {
    let code = code.trim().trim_end_matches('+').to_ascii_uppercase();
    match code.as_str() {
        "CD" | "COMPLETED" | "CG" | "COMPLETING" => JobState::Complete,
        "F" | "FAILED" | "NF" | "NODE_FAIL" | "TO" | "TIMEOUT" | "OOM" | "OUT_OF_MEMORY"
        | "BF" | "BOOT_FAIL" | "DL" | "DEADLINE" => JobState::Failed,
        "CA" | "CANCELLED" | "CANCELED" | "PR" | "PREEMPTED" => JobState::Canceled,
        "PD" | "PENDING" | "CF" | "CONFIGURING" | "RQ" | "REQUEUED" => JobState::Queued,
        "R" | "RUNNING" => JobState::Active,
        "S" | "SUSPENDED" | "ST" | "STOPPED" => JobState::Suspended,
        "RH" | "REQUEUE_HOLD" | "RS" | "RESV_DEL_HOLD" => JobState::Held,
        _ => JobState::Unknown,
    }
}

/// States reported for directly forked processes
pub fn map_fork_state(code: &str) -> JobState {
    match code.trim() {
        "R" => JobState::Active,
        "DONE" => JobState::Complete,
        _ => JobState::Unknown,
    }
}

/// Generic `STATUS_*` provider codes
pub fn map_provider_code(code: &str) -> JobState {
    match code.trim().to_ascii_uppercase().as_str() {
        "STATUS_DONE" => JobState::Complete,
        "STATUS_FAILED" => JobState::Failed,
        "STATUS_ACTIVE" => JobState::Active,
        "STATUS_PENDING" | "STATUS_UNSUBMITTED" => JobState::Queued,
        "STATUS_SUSPENDED" => JobState::Suspended,
        _ => JobState::Unknown,
    }
}

/// Map a code printed by `manager`; `STATUS_*` codes are accepted for any manager
pub fn map_state(manager: JobManagerType, code: &str) -> JobState {
    if code.trim_start().starts_with("STATUS_") {
        return map_provider_code(code);
    }
    match manager {
        JobManagerType::Pbs => map_pbs_state(code),
        JobManagerType::Slurm => map_slurm_state(code),
        JobManagerType::Fork => map_fork_state(code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_codes() {
        assert_eq!(map_provider_code("STATUS_DONE"), JobState::Complete);
        assert_eq!(map_provider_code("STATUS_FAILED"), JobState::Failed);
        assert_eq!(map_provider_code("STATUS_ACTIVE"), JobState::Active);
        assert_eq!(map_provider_code("STATUS_PENDING"), JobState::Queued);
        assert_eq!(map_provider_code("STATUS_UNSUBMITTED"), JobState::Queued);
        assert_eq!(map_provider_code("STATUS_SUSPENDED"), JobState::Suspended);
        assert_eq!(map_provider_code("STATUS_WHATEVER"), JobState::Unknown);
        assert_eq!(map_provider_code(""), JobState::Unknown);
    }

    #[test]
    fn test_slurm_codes() {
        assert_eq!(map_slurm_state("CD"), JobState::Complete);
        assert_eq!(map_slurm_state("running"), JobState::Active);
        assert_eq!(map_slurm_state("CANCELLED+"), JobState::Canceled);
        assert_eq!(map_slurm_state("TIMEOUT"), JobState::Failed);
        assert_eq!(map_slurm_state("PD"), JobState::Queued);
        assert_eq!(map_slurm_state("??"), JobState::Unknown);
    }

    #[test]
    fn test_pbs_codes() {
        assert_eq!(map_pbs_state("C"), JobState::Complete);
        assert_eq!(map_pbs_state("R"), JobState::Active);
        assert_eq!(map_pbs_state("E"), JobState::Active);
        assert_eq!(map_pbs_state("H"), JobState::Held);
        assert_eq!(map_pbs_state("Q"), JobState::Queued);
        assert_eq!(map_pbs_state("Z"), JobState::Unknown);
    }

    #[test]
    fn test_map_state_accepts_provider_codes_everywhere() {
        assert_eq!(map_state(JobManagerType::Pbs, "STATUS_DONE"), JobState::Complete);
        assert_eq!(map_state(JobManagerType::Fork, "DONE"), JobState::Complete);
        assert_eq!(map_state(JobManagerType::Slurm, "R"), JobState::Active);
    }
}
