use crate::common::{experiment, test_config, wait_until, TestSystem, GATEWAY_ID};
use airavata_core::messaging::{MessageBus, MessageEvent};
use airavata_core::orchestrator::OrchestratorApi;
use airavata_core::registry::{JobField, RegistryClient};
use airavata_core::state_machine::{ExperimentState, ProcessState};
use airavata_core::OrchestratorError;

async fn wait_for_process_state(system: &TestSystem, process_id: &str, state: ProcessState) {
    wait_until(&format!("process {process_id} in {state}"), move || async move {
        system.registry.process_states(process_id).contains(&state)
    })
    .await;
}

async fn wait_for_experiment_state(system: &TestSystem, experiment_id: &str, state: ExperimentState) {
    wait_until(&format!("experiment {experiment_id} in {state}"), move || async move {
        system.registry.experiment_states(experiment_id).contains(&state)
    })
    .await;
}

async fn only_job_id(system: &TestSystem, process_id: &str) -> String {
    wait_until("job recorded", move || async move {
        !system
            .registry
            .get_jobs(JobField::ProcessId, process_id)
            .await
            .unwrap()
            .is_empty()
    })
    .await;
    let jobs = system
        .registry
        .get_jobs(JobField::ProcessId, process_id)
        .await
        .unwrap();
    assert_eq!(jobs.len(), 1);
    jobs[0].job_id.clone()
}

#[tokio::test]
async fn test_experiment_runs_to_completion_through_pull_monitor() {
    let system = TestSystem::start(test_config()).await;
    let mut model = experiment("EXP_pull");
    model.user_configuration.experiment_data_dir = Some("/data/EXP_pull".to_string());
    system.add_experiment(model);

    let launched = system
        .context
        .orchestrator
        .launch_experiment("EXP_pull", GATEWAY_ID)
        .await
        .unwrap();
    assert!(launched);

    wait_for_experiment_state(&system, "EXP_pull", ExperimentState::Launched).await;
    let process_id = system.only_process_id("EXP_pull").await;
    wait_for_process_state(&system, &process_id, ProcessState::Executing).await;
    wait_for_experiment_state(&system, "EXP_pull", ExperimentState::Executing).await;

    let job_id = only_job_id(&system, &process_id).await;
    assert_eq!(system.cluster.submissions(), 1, "one sbatch expected");

    system.cluster.set_state(&job_id, "RUNNING");
    wait_for_process_state(&system, &process_id, ProcessState::Monitoring).await;

    system.cluster.set_state(&job_id, "COMPLETED");
    wait_for_process_state(&system, &process_id, ProcessState::Completed).await;
    wait_for_experiment_state(&system, "EXP_pull", ExperimentState::Completed).await;

    // Process history only ever moves forward
    let ranks: Vec<u8> = system
        .registry
        .process_states(&process_id)
        .iter()
        .filter_map(ProcessState::rank)
        .collect();
    assert!(ranks.windows(2).all(|pair| pair[0] < pair[1]), "non-monotonic history {ranks:?}");

    let archive = format!("/data/EXP_pull/{process_id}.tar.gz");
    assert!(system.cluster.commands().iter().any(|command| command.contains(&archive)));

    let experiment_events: Vec<ExperimentState> = system
        .bus
        .published_to(&system.context.config().messaging.status_exchange)
        .into_iter()
        .filter_map(|message| match message.event {
            MessageEvent::ExperimentStatusChange(event) if event.experiment_id == "EXP_pull" => Some(event.state),
            _ => None,
        })
        .collect();
    assert_eq!(experiment_events.last(), Some(&ExperimentState::Completed));

    system.stop().await;
}

#[tokio::test]
async fn test_validation_failure_marks_experiment_failed_without_launching() {
    let system = TestSystem::start(test_config()).await;
    let mut model = experiment("EXP_invalid");
    model.user_configuration.total_cpu_count = 4096;
    system.add_experiment(model);

    let err = system
        .context
        .orchestrator
        .launch_experiment("EXP_invalid", GATEWAY_ID)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::LaunchValidation { .. }), "unexpected {err:?}");

    let stored = system.registry.get_experiment("EXP_invalid").await.unwrap().unwrap();
    assert_eq!(stored.current_state(), Some(ExperimentState::Failed));
    assert_eq!(stored.errors.len(), 1);
    assert_eq!(system.cluster.submissions(), 0);

    let launch_exchange = system.context.config().messaging.process_launch_exchange.clone();
    assert!(system.bus.published_to(&launch_exchange).is_empty());

    system.stop().await;
}

#[tokio::test]
async fn test_experiment_submitted_over_the_bus_is_launched() {
    use airavata_core::messaging::{ExperimentSubmitEvent, MessageContext};

    let system = TestSystem::start(test_config()).await;
    system.add_experiment(experiment("EXP_bus"));

    let config = system.context.config();
    let message = MessageContext::new(
        MessageEvent::ExperimentSubmit(ExperimentSubmitEvent {
            experiment_id: "EXP_bus".to_string(),
            gateway_id: GATEWAY_ID.to_string(),
        }),
        GATEWAY_ID,
    );
    system
        .bus
        .publish(
            &config.messaging.experiment_exchange,
            airavata_core::constants::messaging::EXPERIMENT_LAUNCH_ROUTING_KEY,
            &message,
        )
        .await
        .unwrap();

    wait_for_experiment_state(&system, "EXP_bus", ExperimentState::Launched).await;
    let process_id = system.only_process_id("EXP_bus").await;
    wait_for_process_state(&system, &process_id, ProcessState::Executing).await;

    system.stop().await;
}

#[tokio::test]
async fn test_api_version_is_reported() {
    let system = TestSystem::start(test_config()).await;
    assert_eq!(
        system.context.orchestrator.get_api_version(),
        airavata_core::constants::ORCHESTRATOR_API_VERSION
    );
    system.stop().await;
}
