//! Validate-then-publish pipeline shared by the pull and push monitors.
//!
//! Monitors hand parsed reports to [`StatusPipeline::submit`], which checks
//! them against the registry and queues the survivors on a bounded channel.
//! A single [`StatusSubmitter`] drains the channel: it appends the job
//! status, publishes the job status change and reconciles the owning
//! process. The channel keeps slow publishes from stalling monitor loops.
//!
//! The job status is written before the publish and the reconcile. When
//! either of those fails the status stays marked as unsettled, and handling
//! the same report again finishes the work even though the registry write
//! is now a duplicate.

use super::errors::{MonitorError, MonitorResult};
use super::result::JobStatusResult;
use super::tracker::JobTracker;
use super::validator::{JobStatusValidator, ValidatedJobStatus};
use crate::messaging::{EventPublisher, JobIdentifier, PendingEvents, ProcessIdentifier};
use crate::models::JobStatus;
use crate::registry::{RegistryClient, RegistryError, StatusWrite};
use crate::resilience::{retry_with_backoff, BackoffConfig, RetryDecision};
use crate::state_machine::{JobState, ProcessState, ProcessStateMachine};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Starts the post-processing workflow of a process whose job finished
#[async_trait]
pub trait PostWorkflowLauncher: Send + Sync + 'static {
    async fn launch_post_workflow(&self, process_id: &str, gateway_id: &str) -> MonitorResult<()>;
}

#[derive(Clone)]
pub struct StatusPipeline {
    validator: JobStatusValidator,
    sender: mpsc::Sender<ValidatedJobStatus>,
}

impl std::fmt::Debug for StatusPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusPipeline")
            .field("capacity", &self.sender.max_capacity())
            .finish()
    }
}

impl StatusPipeline {
    pub fn new(
        validator: JobStatusValidator,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<ValidatedJobStatus>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { validator, sender }, receiver)
    }

    /// Validate a report and queue it; `Ok(false)` means it was dropped
    pub async fn submit(&self, result: JobStatusResult) -> MonitorResult<bool> {
        let Some(validated) = self.validator.validate(&result).await? else {
            return Ok(false);
        };
        self.sender
            .send(validated)
            .await
            .map_err(|_| MonitorError::PipelineClosed)?;
        Ok(true)
    }

    pub fn validator(&self) -> &JobStatusValidator {
        &self.validator
    }
}

/// Consumer side of the pipeline
pub struct StatusSubmitter {
    registry: Arc<dyn RegistryClient>,
    publisher: EventPublisher,
    process_state: ProcessStateMachine,
    post_workflow: Arc<dyn PostWorkflowLauncher>,
    tracker: Arc<JobTracker>,
    publish_attempts: u32,
    backoff: BackoffConfig,
    pending: PendingEvents,
    // job id -> applied state whose publish or reconcile has not finished
    unsettled: DashMap<String, JobState>,
}

impl StatusSubmitter {
    pub fn new(
        registry: Arc<dyn RegistryClient>,
        publisher: EventPublisher,
        process_state: ProcessStateMachine,
        post_workflow: Arc<dyn PostWorkflowLauncher>,
        tracker: Arc<JobTracker>,
        publish_attempts: u32,
        backoff: BackoffConfig,
    ) -> Self {
        Self {
            registry,
            publisher,
            process_state,
            post_workflow,
            tracker,
            publish_attempts,
            backoff,
            pending: PendingEvents::new(),
            unsettled: DashMap::new(),
        }
    }

    pub fn is_settled(&self, job_id: &str) -> bool {
        !self.unsettled.contains_key(job_id) && !self.pending.has_pending(job_id)
    }

    /// Drain the pipeline until it closes or `token` is cancelled
    pub async fn run(self: Arc<Self>, mut receiver: mpsc::Receiver<ValidatedJobStatus>, token: CancellationToken) {
        info!("📤 PUBLISH: Status submitter started");
        loop {
            let status = tokio::select! {
                _ = token.cancelled() => break,
                next = receiver.recv() => match next {
                    Some(status) => status,
                    None => break,
                },
            };
            let job_id = status.job.job_id.clone();
            let submitted = tokio::select! {
                _ = token.cancelled() => break,
                result = retry_with_backoff(
                    &self.backoff,
                    self.publish_attempts,
                    "submit_job_status",
                    || self.handle(status.clone()),
                    |e: &MonitorError| {
                        if e.is_transient() {
                            RetryDecision::Retry
                        } else {
                            RetryDecision::Abort
                        }
                    },
                ) => result,
            };
            if let Err(e) = submitted {
                error!(job_id = %job_id, error = %e, "Failed to submit job status");
            }
        }
        info!("📤 PUBLISH: Status submitter stopped");
    }

    /// Persist, publish and reconcile one validated report
    #[instrument(skip(self, status), fields(job_id = %status.job.job_id, state = %status.state))]
    pub async fn handle(&self, status: ValidatedJobStatus) -> MonitorResult<StatusWrite> {
        let job = &status.job;
        let entry = match &status.reason {
            Some(reason) => JobStatus::with_reason(status.state, reason),
            None => JobStatus::new(status.state),
        };

        let write = {
            let registry = &self.registry;
            let entry = &entry;
            retry_with_backoff(
                &self.backoff,
                self.publish_attempts,
                "add_job_status",
                move || async move { registry.add_job_status(&job.job_id, &job.task_id, entry.clone()).await },
                |e: &RegistryError| {
                    if e.is_transient() {
                        RetryDecision::Retry
                    } else {
                        RetryDecision::Abort
                    }
                },
            )
            .await?
        };

        match &write {
            StatusWrite::Applied => {
                let identity = JobIdentifier {
                    job_id: job.job_id.clone(),
                    task_id: job.task_id.clone(),
                    process_id: status.process.process_id.clone(),
                    experiment_id: status.experiment_id.clone(),
                    gateway_id: status.gateway_id.clone(),
                };
                self.unsettled.insert(job.job_id.clone(), status.state);
                self.pending
                    .record(&job.job_id, EventPublisher::job_status_message(&identity, status.state));
            }
            StatusWrite::Duplicate => {
                let unsettled = self
                    .unsettled
                    .get(&job.job_id)
                    .is_some_and(|state| *state == status.state);
                if !unsettled && !self.pending.has_pending(&job.job_id) {
                    debug!(job_id = %job.job_id, state = %status.state, "Job already in state, skipping");
                    return Ok(write);
                }
                info!(job_id = %job.job_id, state = %status.state, "Resuming unsettled job status");
            }
            StatusWrite::Rejected { reason } => {
                warn!(job_id = %job.job_id, state = %status.state, reason = %reason, "Job status update invalid, skipping");
                return Ok(write);
            }
        }

        if self
            .pending
            .flush(&job.job_id, &self.publisher, self.publish_attempts, &self.backoff)
            .await?
            > 0
        {
            crate::logging::log_job_status(&job.job_id, &status.process.process_id, &status.state.to_string());
        }

        if status.state.is_terminal() {
            self.tracker.untrack(&job.job_id);
        }

        let reconcile = self
            .unsettled
            .get(&job.job_id)
            .is_some_and(|state| *state == status.state);
        if !reconcile {
            return Ok(write);
        }
        self.reconcile_process(&status).await?;
        self.unsettled.remove_if(&job.job_id, |_, state| *state == status.state);
        Ok(write)
    }

    async fn reconcile_process(&self, status: &ValidatedJobStatus) -> MonitorResult<()> {
        let process_id = &status.process.process_id;
        let identity = ProcessIdentifier::new(process_id, &status.experiment_id, &status.gateway_id);
        let current = self.process_state.current_state(process_id).await?;

        if current.is_some_and(|state| state.is_cancel_branch()) {
            match status.state {
                JobState::Failed | JobState::Suspended | JobState::Canceled | JobState::Complete => {
                    info!(
                        process_id = %process_id,
                        job_state = %status.state,
                        "Job of cancelled process settled, marking process canceled"
                    );
                    self.process_state
                        .transition(&identity, ProcessState::Canceled, None)
                        .await?;
                }
                _ => debug!(process_id = %process_id, job_state = %status.state, "Ignoring job state of cancelled process"),
            }
            return Ok(());
        }

        match status.state {
            JobState::Complete | JobState::Failed => {
                info!(process_id = %process_id, job_state = %status.state, "Running post workflow");
                self.post_workflow
                    .launch_post_workflow(process_id, &status.gateway_id)
                    .await?;
            }
            JobState::Canceled => {
                self.process_state
                    .transition(&identity, ProcessState::Canceled, None)
                    .await?;
            }
            JobState::Active => {
                let next = match current {
                    Some(ProcessState::Executing) => Some(ProcessState::Monitoring),
                    Some(state) if state.rank() >= ProcessState::Monitoring.rank() => None,
                    _ => Some(ProcessState::Executing),
                };
                if let Some(next) = next {
                    self.process_state.transition(&identity, next, None).await?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}
