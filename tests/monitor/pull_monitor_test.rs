use crate::common::{test_config, ScriptedSlurm, COMPUTE_RESOURCE_ID, GATEWAY_ID};
use airavata_core::adaptor::StaticAdaptorResolver;
use airavata_core::constants::reasons;
use airavata_core::models::{ExperimentModel, JobManagerType, JobModel, ProcessModel};
use airavata_core::monitor::{JobStatusValidator, JobTracker, PullMonitor, StatusPipeline, TrackedJob};
use airavata_core::registry::InMemoryRegistry;
use airavata_core::state_machine::JobState;
use std::sync::Arc;

struct PullFixture {
    registry: Arc<InMemoryRegistry>,
    cluster: Arc<ScriptedSlurm>,
    tracker: Arc<JobTracker>,
    monitor: PullMonitor,
    statuses: tokio::sync::mpsc::Receiver<airavata_core::monitor::ValidatedJobStatus>,
}

fn fixture() -> PullFixture {
    let registry = Arc::new(InMemoryRegistry::new());
    registry.insert_experiment(ExperimentModel::new("EXP_pm", GATEWAY_ID, "it-user"));
    registry.insert_process(ProcessModel::new("EXP_pm", GATEWAY_ID).with_id("PROC_pm"));
    registry.insert_job(JobModel::new("7001", "A7001", "PROC_pm", "JOB_SUBMISSION_1"));

    let cluster = Arc::new(ScriptedSlurm::default());
    let tracker = Arc::new(JobTracker::new());
    let (pipeline, statuses) = StatusPipeline::new(JobStatusValidator::new(registry.clone()), 16);
    let monitor = PullMonitor::new(
        Arc::clone(&tracker),
        Arc::new(StaticAdaptorResolver::single(cluster.clone())),
        pipeline,
        test_config().monitor,
    );
    PullFixture {
        registry,
        cluster,
        tracker,
        monitor,
        statuses,
    }
}

fn tracked(job_id: &str, job_name: &str) -> TrackedJob {
    TrackedJob {
        job_id: job_id.to_string(),
        job_name: job_name.to_string(),
        task_id: "JOB_SUBMISSION_1".to_string(),
        process_id: "PROC_pm".to_string(),
        experiment_id: "EXP_pm".to_string(),
        gateway_id: GATEWAY_ID.to_string(),
        compute_resource_id: COMPUTE_RESOURCE_ID.to_string(),
        job_manager: JobManagerType::Slurm,
        last_state: Some(JobState::Submitted),
        consecutive_failures: 0,
    }
}

#[tokio::test]
async fn test_state_changes_are_emitted_once() {
    let mut f = fixture();
    f.tracker.track(tracked("7001", "A7001"));
    f.cluster.set_state("7001", "RUNNING");

    let summary = f.monitor.poll_once().await;
    assert_eq!(summary.polled, 1);
    assert_eq!(summary.emitted, 1);
    let status = f.statuses.try_recv().unwrap();
    assert_eq!(status.state, JobState::Active);
    assert_eq!(status.process.process_id, "PROC_pm");
    assert_eq!(status.experiment_id, "EXP_pm");

    // Same answer again: nothing new to report
    let summary = f.monitor.poll_once().await;
    assert_eq!(summary.emitted, 0);
    assert!(f.statuses.try_recv().is_err());

    f.cluster.set_state("7001", "COMPLETED");
    f.monitor.poll_once().await;
    assert_eq!(f.statuses.try_recv().unwrap().state, JobState::Complete);
}

#[tokio::test]
async fn test_job_missing_from_registry_is_dropped_without_status() {
    let mut f = fixture();
    f.tracker.track(tracked("9999", "A9999"));
    f.cluster.set_state("9999", "RUNNING");

    let summary = f.monitor.poll_once().await;
    assert_eq!(summary.emitted, 0);
    assert_eq!(summary.dropped, 1);
    assert!(f.statuses.try_recv().is_err());
    assert!(!f.tracker.is_tracked("9999"));
    assert_eq!(f.registry.job_count(), 1);
}

#[tokio::test]
async fn test_job_unknown_to_resource_manager_reports_unknown_after_repeated_misses() {
    let mut f = fixture();
    f.tracker.track(tracked("7001", "A7001"));

    // `max_consecutive_failures` is 2 in the test configuration
    let first = f.monitor.poll_once().await;
    assert_eq!(first.failures, 1);
    assert!(f.statuses.try_recv().is_err());
    assert!(f.tracker.is_tracked("7001"));

    f.monitor.poll_once().await;
    let status = f.statuses.try_recv().unwrap();
    assert_eq!(status.state, JobState::Unknown);
    assert_eq!(status.reason.as_deref(), Some(reasons::JOB_UNREACHABLE));
    assert!(!f.tracker.is_tracked("7001"));
}

#[tokio::test]
async fn test_cancelled_jobs_are_no_longer_polled() {
    let mut f = fixture();
    f.tracker.track(tracked("7001", "A7001"));
    f.cluster.set_state("7001", "RUNNING");
    f.tracker.mark_cancelled("7001");

    let summary = f.monitor.poll_once().await;
    assert_eq!(summary.polled, 0);
    assert!(f.statuses.try_recv().is_err());
    assert_eq!(f.cluster.commands_starting_with("sacct "), 0);
}

#[tokio::test]
async fn test_status_is_reported_again_after_registry_outage() {
    let mut f = fixture();
    f.tracker.track(tracked("7001", "A7001"));
    f.cluster.set_state("7001", "COMPLETED");
    f.registry.fail_next_calls(1);

    let first = f.monitor.poll_once().await;
    assert_eq!(first.emitted, 0);
    assert_eq!(first.failures, 1);
    assert!(f.statuses.try_recv().is_err());
    assert_eq!(f.tracker.get("7001").and_then(|job| job.last_state), Some(JobState::Submitted));

    let second = f.monitor.poll_once().await;
    assert_eq!(second.emitted, 1);
    assert_eq!(f.statuses.try_recv().unwrap().state, JobState::Complete);
    assert_eq!(f.tracker.get("7001").and_then(|job| job.last_state), Some(JobState::Complete));
}
