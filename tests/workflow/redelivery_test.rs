use crate::common::{experiment, test_config, wait_until, TestSystem, GATEWAY_ID};
use airavata_core::constants::messaging as keys;
use airavata_core::messaging::{
    ExperimentSubmitEvent, MessageBus, MessageContext, MessageEvent, ProcessSubmitEvent,
};
use airavata_core::orchestrator::OrchestratorApi;
use airavata_core::registry::RegistryClient;
use airavata_core::state_machine::ProcessState;

async fn wait_for_acks(system: &TestSystem, queue: &'static str, acked: u64) {
    wait_until(&format!("{acked} acks on {queue}"), move || async move {
        system
            .bus
            .queue_stats(queue)
            .await
            .is_ok_and(|stats| stats.total_acked >= acked)
    })
    .await;
}

#[tokio::test]
async fn test_duplicate_process_launch_does_not_resubmit_the_job() {
    let system = TestSystem::start(test_config()).await;
    system.add_experiment(experiment("EXP_dup"));
    assert!(system
        .context
        .orchestrator
        .launch_experiment("EXP_dup", GATEWAY_ID)
        .await
        .unwrap());
    wait_for_acks(&system, keys::PROCESS_LAUNCH_QUEUE, 1).await;

    let process_id = system.only_process_id("EXP_dup").await;
    assert!(system.registry.process_states(&process_id).contains(&ProcessState::Executing));
    assert_eq!(system.cluster.submissions(), 1);

    let duplicate = MessageContext::new(
        MessageEvent::ProcessSubmit(ProcessSubmitEvent {
            process_id: process_id.clone(),
            experiment_id: "EXP_dup".to_string(),
            gateway_id: GATEWAY_ID.to_string(),
            token_id: "it-token".to_string(),
        }),
        GATEWAY_ID,
    );
    let exchange = system.context.config().messaging.process_launch_exchange.clone();
    system
        .bus
        .publish(&exchange, keys::PROCESS_LAUNCH_ROUTING_KEY, &duplicate)
        .await
        .unwrap();
    wait_for_acks(&system, keys::PROCESS_LAUNCH_QUEUE, 2).await;

    assert_eq!(system.cluster.submissions(), 1);
    assert_eq!(system.registry.job_count(), 1);
    let states = system.registry.process_states(&process_id);
    assert_eq!(states.iter().filter(|state| **state == ProcessState::Started).count(), 1);

    system.stop().await;
}

#[tokio::test]
async fn test_duplicate_experiment_submit_launches_once() {
    let system = TestSystem::start(test_config()).await;
    system.add_experiment(experiment("EXP_twice"));

    let exchange = system.context.config().messaging.experiment_exchange.clone();
    let message = MessageContext::new(
        MessageEvent::ExperimentSubmit(ExperimentSubmitEvent {
            experiment_id: "EXP_twice".to_string(),
            gateway_id: GATEWAY_ID.to_string(),
        }),
        GATEWAY_ID,
    );
    for _ in 0..2 {
        system
            .bus
            .publish(&exchange, keys::EXPERIMENT_LAUNCH_ROUTING_KEY, &message)
            .await
            .unwrap();
    }
    wait_for_acks(&system, keys::EXPERIMENT_LAUNCH_QUEUE, 2).await;
    wait_for_acks(&system, keys::PROCESS_LAUNCH_QUEUE, 1).await;

    let processes = system
        .registry
        .get_processes_for_experiment("EXP_twice")
        .await
        .unwrap();
    assert_eq!(processes.len(), 1);
    assert_eq!(system.cluster.submissions(), 1);

    system.stop().await;
}
