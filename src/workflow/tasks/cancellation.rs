use super::task_failure;
use crate::constants::reasons;
use crate::models::WorkflowKind;
use crate::registry::JobField;
use crate::state_machine::ProcessState;
use crate::workflow::context::TaskContext;
use crate::workflow::errors::{WorkflowError, WorkflowResult};
use crate::workflow::task::ProcessTask;
use crate::workflow::types::{TaskResult, TaskType};
use async_trait::async_trait;
use tracing::warn;

/// Cancels the other running workflows of the process
#[derive(Debug, Default)]
pub struct WorkflowCancellationTask;

#[async_trait]
impl ProcessTask for WorkflowCancellationTask {
    fn task_type(&self) -> TaskType {
        TaskType::WorkflowCancellation
    }

    async fn on_run(&self, context: &TaskContext) -> TaskResult {
        let cancelled = context
            .services
            .workflows
            .cancel_for_process(context.process_id(), WorkflowKind::Cancel);
        context.log_step(&format!("Cancelled {} running workflow(s)", cancelled.len()));
        TaskResult::success()
    }
}

/// Asks the resource manager to kill live jobs of the process
///
/// The kill is best effort: a failed cancel command is logged and the task
/// still succeeds, so the process reaches CANCELED either way. The jobs are
/// always taken off the pull monitor.
#[derive(Debug, Default)]
pub struct RemoteJobCancellationTask;

impl RemoteJobCancellationTask {
    async fn run(&self, context: &TaskContext) -> WorkflowResult<TaskResult> {
        let jobs = context
            .services
            .registry
            .get_jobs(JobField::ProcessId, context.process_id())
            .await?;
        let live: Vec<_> = jobs.into_iter().filter(|job| job.is_live()).collect();
        if live.is_empty() {
            return Ok(TaskResult::success_with("No live jobs to cancel"));
        }

        let mut killed = 0;
        for job in &live {
            context.services.job_tracker.mark_cancelled(&job.job_id);

            let resource_id = job
                .compute_resource_id
                .as_deref()
                .or(context.process.compute_resource_id.as_deref());
            let Some(resource_id) = resource_id else {
                warn!(job_id = %job.job_id, "No compute resource recorded for job, skipping kill");
                continue;
            };
            let kill = async {
                let resource = context
                    .services
                    .registry
                    .get_compute_resource(resource_id)
                    .await?
                    .ok_or_else(|| {
                        WorkflowError::missing("compute resource", context.process_id())
                    })?;
                let adaptor = context.services.adaptors.resolve(resource_id).await?;
                let output = adaptor
                    .execute_command(&resource.job_manager.cancel_command(&job.job_id), None)
                    .await?;
                WorkflowResult::Ok(output)
            };
            match kill.await {
                Ok(output) if output.is_success() => killed += 1,
                Ok(output) => warn!(
                    job_id = %job.job_id,
                    exit_code = output.exit_code,
                    stderr = %output.stderr.trim(),
                    "Remote job cancel command failed"
                ),
                Err(e) => warn!(job_id = %job.job_id, error = %e, "Could not cancel remote job"),
            }
        }
        context.log_step(&format!("Killed {killed} of {} live job(s)", live.len()));
        Ok(TaskResult::success_with(format!("Killed {killed} of {} live job(s)", live.len())))
    }
}

#[async_trait]
impl ProcessTask for RemoteJobCancellationTask {
    fn task_type(&self) -> TaskType {
        TaskType::RemoteJobCancellation
    }

    async fn on_run(&self, context: &TaskContext) -> TaskResult {
        self.run(context)
            .await
            .unwrap_or_else(|e| task_failure(context, e))
    }
}

/// Moves the process to CANCELED
#[derive(Debug, Default)]
pub struct CancelCompletingTask;

impl CancelCompletingTask {
    async fn run(&self, context: &TaskContext) -> WorkflowResult<TaskResult> {
        context
            .transition_process(ProcessState::Canceled, Some(reasons::CANCEL_COMPLETED))
            .await?;
        context.log_step("Process canceled");
        Ok(TaskResult::success())
    }
}

#[async_trait]
impl ProcessTask for CancelCompletingTask {
    fn task_type(&self) -> TaskType {
        TaskType::CancelCompleting
    }

    async fn on_run(&self, context: &TaskContext) -> TaskResult {
        self.run(context)
            .await
            .unwrap_or_else(|e| task_failure(context, e))
    }
}
