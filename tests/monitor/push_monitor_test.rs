use crate::common::{test_config, GATEWAY_ID};
use airavata_core::messaging::{InMemoryTopic, TopicConsumer};
use airavata_core::models::{ExperimentModel, JobModel, ProcessModel};
use airavata_core::monitor::{
    JobStatusResult, JobStatusValidator, ParserRegistry, PushMonitor, StatusPipeline, ValidatedJobStatus,
};
use airavata_core::registry::InMemoryRegistry;
use airavata_core::state_machine::JobState;
use std::sync::Arc;
use tokio::sync::mpsc::Receiver;

fn fixture() -> (Arc<InMemoryTopic>, PushMonitor, Receiver<ValidatedJobStatus>) {
    let registry = Arc::new(InMemoryRegistry::new());
    registry.insert_experiment(ExperimentModel::new("EXP_push", GATEWAY_ID, "it-user"));
    registry.insert_process(ProcessModel::new("EXP_push", GATEWAY_ID).with_id("PROC_push"));
    registry.insert_job(JobModel::new("8100", "A8100", "PROC_push", "JOB_SUBMISSION_1"));

    let topic = Arc::new(InMemoryTopic::new("monitoring-data"));
    let (pipeline, statuses) = StatusPipeline::new(JobStatusValidator::new(registry), 16);
    let monitor = PushMonitor::new(
        topic.clone(),
        ParserRegistry::with_defaults().unwrap(),
        pipeline,
        test_config().monitor.push,
    );
    (topic, monitor, statuses)
}

#[tokio::test]
async fn test_json_and_slurm_mail_records_reach_the_pipeline() {
    let (topic, monitor, mut statuses) = fixture();
    let json = JobStatusResult::new("8100", "A8100", JobState::Active).published_by("email-monitor");
    topic.produce(Some("json"), serde_json::to_string(&json).unwrap());
    topic.produce(
        Some("slurm"),
        "Slurm Job_id=8100 Name=A8100 Ended, Run time 00:10:00, COMPLETED, ExitCode 0",
    );

    let summary = monitor.process_batch().await.unwrap();
    assert_eq!(summary.received, 2);
    assert_eq!(summary.submitted, 2);
    assert_eq!(statuses.try_recv().unwrap().state, JobState::Active);
    assert_eq!(statuses.try_recv().unwrap().state, JobState::Complete);
}

#[tokio::test]
async fn test_bad_records_are_skipped_and_committed() {
    let (topic, monitor, mut statuses) = fixture();
    topic.produce(Some("json"), "{not json");
    topic.produce(Some("carrier-pigeon"), "job 8100 finished");
    let stranger = JobStatusResult::new("8100", "A_someone_else", JobState::Complete);
    topic.produce(None, serde_json::to_string(&stranger).unwrap());
    let ours = JobStatusResult::new("8100", "A8100", JobState::Failed);
    topic.produce(None, serde_json::to_string(&ours).unwrap());

    let summary = monitor.process_batch().await.unwrap();
    assert_eq!(summary.received, 4);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.dropped, 1);
    assert_eq!(summary.submitted, 1);
    assert_eq!(statuses.try_recv().unwrap().state, JobState::Failed);

    // Everything was committed, a rewind replays nothing
    topic.rewind_to_committed();
    let summary = monitor.process_batch().await.unwrap();
    assert_eq!(summary.received, 0);
}
