use crate::common::{experiment, test_config, wait_until, TestSystem, GATEWAY_ID};
use airavata_core::orchestrator::OrchestratorApi;
use airavata_core::registry::{JobField, RegistryClient};
use airavata_core::state_machine::{ExperimentState, JobState, ProcessState};

async fn launch_to_executing(system: &TestSystem, experiment_id: &str) -> String {
    system.add_experiment(experiment(experiment_id));
    assert!(system
        .context
        .orchestrator
        .launch_experiment(experiment_id, GATEWAY_ID)
        .await
        .unwrap());

    wait_until("process created", move || async move {
        !system
            .registry
            .get_processes_for_experiment(experiment_id)
            .await
            .unwrap()
            .is_empty()
    })
    .await;
    let process_id = system.only_process_id(experiment_id).await;
    let pid = process_id.as_str();
    wait_until("experiment executing", move || async move {
        system.registry.experiment_states(experiment_id).contains(&ExperimentState::Executing)
            && system.registry.process_states(pid).contains(&ProcessState::Executing)
    })
    .await;
    process_id
}

#[tokio::test]
async fn test_terminate_running_experiment_cancels_even_when_kill_fails() {
    let system = TestSystem::start(test_config()).await;
    let process_id = launch_to_executing(&system, "EXP_cancel").await;
    system.cluster.fail_kills(true);

    let terminated = system
        .context
        .orchestrator
        .terminate_experiment("EXP_cancel", GATEWAY_ID)
        .await
        .unwrap();
    assert!(terminated);

    let pid = process_id.as_str();
    let registry = &system.registry;
    wait_until("process canceled", move || async move {
        registry.process_states(pid).contains(&ProcessState::Canceled)
    })
    .await;
    wait_until("experiment canceled", move || async move {
        registry.experiment_states("EXP_cancel").contains(&ExperimentState::Canceled)
    })
    .await;

    let states = system.registry.process_states(&process_id);
    let cancelling = states.iter().position(|state| *state == ProcessState::Cancelling);
    let canceled = states.iter().position(|state| *state == ProcessState::Canceled);
    assert!(cancelling.is_some() && cancelling < canceled, "history {states:?}");
    assert_eq!(states.last(), Some(&ProcessState::Canceled));

    let experiment_states = system.registry.experiment_states("EXP_cancel");
    assert!(experiment_states.contains(&ExperimentState::Canceling));
    assert_eq!(experiment_states.last(), Some(&ExperimentState::Canceled));
    assert_eq!(system.cluster.commands_starting_with("scancel "), 1);

    // A second request finds nothing left to cancel
    let again = system
        .context
        .orchestrator
        .terminate_experiment("EXP_cancel", GATEWAY_ID)
        .await
        .unwrap();
    assert!(!again);

    system.stop().await;
}

#[tokio::test]
async fn test_late_completion_does_not_revive_canceled_process() {
    let system = TestSystem::start(test_config()).await;
    let process_id = launch_to_executing(&system, "EXP_late").await;

    assert!(system
        .context
        .orchestrator
        .terminate_experiment("EXP_late", GATEWAY_ID)
        .await
        .unwrap());
    let pid = process_id.as_str();
    let registry = &system.registry;
    wait_until("process canceled", move || async move {
        registry.process_states(pid).contains(&ProcessState::Canceled)
    })
    .await;

    // The resource manager reports completion after the cancel went through
    let jobs = system
        .registry
        .get_jobs(JobField::ProcessId, &process_id)
        .await
        .unwrap();
    let job = &jobs[0];
    let late = airavata_core::monitor::JobStatusResult::new(&job.job_id, &job.job_name, JobState::Complete);
    system
        .topic
        .produce(Some("json"), serde_json::to_string(&late).unwrap());

    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    let states = system.registry.process_states(&process_id);
    assert_eq!(states.last(), Some(&ProcessState::Canceled));
    assert!(!states.contains(&ProcessState::Completed));
    assert!(!states.contains(&ProcessState::OutputDataStaging));

    system.stop().await;
}

#[tokio::test]
async fn test_terminate_created_experiment_is_refused() {
    let system = TestSystem::start(test_config()).await;
    system.add_experiment(experiment("EXP_idle"));

    let terminated = system
        .context
        .orchestrator
        .terminate_experiment("EXP_idle", GATEWAY_ID)
        .await
        .unwrap();
    assert!(!terminated);
    assert_eq!(
        system.registry.experiment_states("EXP_idle"),
        vec![ExperimentState::Created]
    );

    system.stop().await;
}
