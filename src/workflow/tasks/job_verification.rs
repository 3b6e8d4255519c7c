use super::task_failure;
use crate::registry::JobField;
use crate::workflow::context::TaskContext;
use crate::workflow::errors::WorkflowResult;
use crate::workflow::task::ProcessTask;
use crate::workflow::types::{TaskResult, TaskType};
use async_trait::async_trait;

/// Confirms the process has a recorded job before post-processing
///
/// A FAILED job still passes so that outputs can be staged for debugging.
#[derive(Debug, Default)]
pub struct JobVerificationTask;

impl JobVerificationTask {
    async fn run(&self, context: &TaskContext) -> WorkflowResult<TaskResult> {
        let jobs = context
            .services
            .registry
            .get_jobs(JobField::ProcessId, context.process_id())
            .await?;
        let Some(job) = jobs.last() else {
            return Ok(TaskResult::fail(
                format!("No job recorded for process {}", context.process_id()),
                false,
            ));
        };
        let state = job
            .current_state()
            .map_or_else(|| "unknown".to_string(), |state| state.to_string());
        context.log_step(&format!("Job {} verified in state {state}", job.job_id));
        Ok(TaskResult::success_with(format!("Job {} in state {state}", job.job_id)))
    }
}

#[async_trait]
impl ProcessTask for JobVerificationTask {
    fn task_type(&self) -> TaskType {
        TaskType::JobVerification
    }

    async fn on_run(&self, context: &TaskContext) -> TaskResult {
        self.run(context)
            .await
            .unwrap_or_else(|e| task_failure(context, e))
    }
}
