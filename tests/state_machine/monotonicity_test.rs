use crate::common::GATEWAY_ID;
use airavata_core::messaging::{EventPublisher, InMemoryMessageBus, MessageEvent, ProcessIdentifier};
use airavata_core::models::{ExperimentModel, ExperimentStatus, JobModel, JobStatus, ProcessModel, ProcessStatus};
use airavata_core::registry::{InMemoryRegistry, RegistryClient, StatusWrite};
use airavata_core::resilience::BackoffConfig;
use airavata_core::state_machine::{ExperimentState, JobState, ProcessState, ProcessStateMachine};
use std::sync::Arc;

fn seeded() -> Arc<InMemoryRegistry> {
    let registry = Arc::new(InMemoryRegistry::new());
    registry.insert_experiment(ExperimentModel::new("EXP_m", GATEWAY_ID, "it-user"));
    registry.insert_process(ProcessModel::new("EXP_m", GATEWAY_ID).with_id("PROC_m"));
    registry
}

#[tokio::test]
async fn test_terminal_process_states_are_sticky() {
    let registry = seeded();
    for state in [ProcessState::Started, ProcessState::Executing, ProcessState::Completed] {
        let write = registry
            .add_process_status("PROC_m", ProcessStatus::new(state))
            .await
            .unwrap();
        assert_eq!(write, StatusWrite::Applied);
    }

    for late in [ProcessState::Executing, ProcessState::Failed, ProcessState::Canceled] {
        let write = registry
            .add_process_status("PROC_m", ProcessStatus::new(late))
            .await
            .unwrap();
        assert!(matches!(write, StatusWrite::Rejected { .. }), "{late} was {write:?}");
    }
    let duplicate = registry
        .add_process_status("PROC_m", ProcessStatus::new(ProcessState::Completed))
        .await
        .unwrap();
    assert_eq!(duplicate, StatusWrite::Duplicate);
    assert_eq!(
        registry.get_process_status("PROC_m").await.unwrap().unwrap().state,
        ProcessState::Completed
    );
}

#[tokio::test]
async fn test_cancelling_only_leads_to_canceled() {
    let registry = seeded();
    registry
        .add_process_status("PROC_m", ProcessStatus::new(ProcessState::Executing))
        .await
        .unwrap();
    let cancelling = registry
        .add_process_status("PROC_m", ProcessStatus::new(ProcessState::Cancelling))
        .await
        .unwrap();
    assert!(cancelling.is_applied());

    let resumed = registry
        .add_process_status("PROC_m", ProcessStatus::new(ProcessState::Monitoring))
        .await
        .unwrap();
    assert!(!resumed.is_applied());

    let canceled = registry
        .add_process_status("PROC_m", ProcessStatus::new(ProcessState::Canceled))
        .await
        .unwrap();
    assert!(canceled.is_applied());
}

#[tokio::test]
async fn test_experiment_terminal_state_is_final() {
    let registry = seeded();
    for state in [ExperimentState::Launched, ExperimentState::Executing, ExperimentState::Completed] {
        assert!(registry
            .update_experiment_status("EXP_m", ExperimentStatus::new(state))
            .await
            .unwrap()
            .is_applied());
    }
    let late = registry
        .update_experiment_status("EXP_m", ExperimentStatus::new(ExperimentState::Canceling))
        .await
        .unwrap();
    assert!(!late.is_applied());
    assert_eq!(
        registry.experiment_states("EXP_m").last(),
        Some(&ExperimentState::Completed)
    );
}

#[tokio::test]
async fn test_terminal_job_state_is_not_overwritten() {
    let registry = seeded();
    registry.insert_job(JobModel::new("300", "A300", "PROC_m", "JOB_SUBMISSION_1"));
    for state in [JobState::Submitted, JobState::Active, JobState::Complete] {
        registry
            .add_job_status("300", "JOB_SUBMISSION_1", JobStatus::new(state))
            .await
            .unwrap();
    }
    let late = registry
        .add_job_status("300", "JOB_SUBMISSION_1", JobStatus::new(JobState::Queued))
        .await
        .unwrap();
    assert!(!late.is_applied());
}

#[tokio::test]
async fn test_status_events_are_published_only_for_applied_writes() {
    let registry = seeded();
    let bus = Arc::new(InMemoryMessageBus::new(16));
    let publisher = EventPublisher::new(bus.clone(), "status_exchange");
    let machine = ProcessStateMachine::new(registry.clone(), publisher, 2, BackoffConfig::immediate());
    let identity = ProcessIdentifier::new("PROC_m", "EXP_m", GATEWAY_ID);

    machine.transition(&identity, ProcessState::Executing, None).await.unwrap();
    machine.transition(&identity, ProcessState::Executing, None).await.unwrap();
    machine.transition(&identity, ProcessState::Started, None).await.unwrap();
    machine.transition(&identity, ProcessState::Completed, None).await.unwrap();

    let published: Vec<ProcessState> = bus
        .published_to("status_exchange")
        .into_iter()
        .filter_map(|message| match message.event {
            MessageEvent::ProcessStatusChange(event) => Some(event.state),
            _ => None,
        })
        .collect();
    assert_eq!(published, vec![ProcessState::Executing, ProcessState::Completed]);
}
