use crate::common::GATEWAY_ID;
use airavata_core::models::{ExperimentModel, JobModel, ProcessModel};
use airavata_core::monitor::{JobStatusResult, JobStatusValidator};
use airavata_core::registry::InMemoryRegistry;
use airavata_core::state_machine::JobState;
use std::sync::Arc;

fn registry() -> Arc<InMemoryRegistry> {
    let registry = Arc::new(InMemoryRegistry::new());
    registry.insert_experiment(ExperimentModel::new("EXP_v", GATEWAY_ID, "it-user"));
    registry.insert_process(ProcessModel::new("EXP_v", GATEWAY_ID).with_id("PROC_v"));
    registry
}

#[tokio::test]
async fn test_single_matching_job_resolves_owners() {
    let registry = registry();
    registry.insert_job(JobModel::new("42", "A42", "PROC_v", "JOB_SUBMISSION_1"));
    let validator = JobStatusValidator::new(registry);

    let result = JobStatusResult::new("42", "A42", JobState::Queued).with_reason("pending");
    let validated = validator.validate(&result).await.unwrap().unwrap();
    assert_eq!(validated.job.job_id, "42");
    assert_eq!(validated.process.process_id, "PROC_v");
    assert_eq!(validated.experiment_id, "EXP_v");
    assert_eq!(validated.gateway_id, GATEWAY_ID);
    assert_eq!(validated.reason.as_deref(), Some("pending"));
    assert!(validator.validate_job_status(&result).await);
}

#[tokio::test]
async fn test_zero_or_ambiguous_matches_are_rejected() {
    let registry = registry();
    // Job ids are reused across clusters, names tell them apart
    registry.insert_job(JobModel::new("42", "A42", "PROC_v", "JOB_SUBMISSION_1"));
    registry.insert_job(JobModel::new("42", "A42", "PROC_v", "JOB_SUBMISSION_2"));
    registry.insert_job(JobModel::new("43", "A43", "PROC_missing", "JOB_SUBMISSION_3"));
    let validator = JobStatusValidator::new(registry);

    let unknown = JobStatusResult::new("41", "A41", JobState::Active);
    assert!(validator.validate(&unknown).await.unwrap().is_none());

    let wrong_name = JobStatusResult::new("43", "B43", JobState::Active);
    assert!(!validator.validate_job_status(&wrong_name).await);

    let ambiguous = JobStatusResult::new("42", "A42", JobState::Active);
    assert!(!validator.validate_job_status(&ambiguous).await);

    let orphan = JobStatusResult::new("43", "A43", JobState::Active);
    assert!(!validator.validate_job_status(&orphan).await);
}

#[tokio::test]
async fn test_registry_outage_is_an_error_not_a_drop() {
    let registry = registry();
    registry.insert_job(JobModel::new("42", "A42", "PROC_v", "JOB_SUBMISSION_1"));
    registry.fail_next_calls(1);
    let validator = JobStatusValidator::new(registry);

    let result = JobStatusResult::new("42", "A42", JobState::Active);
    assert!(validator.validate(&result).await.is_err());
    assert!(validator.validate(&result).await.unwrap().is_some());
}
