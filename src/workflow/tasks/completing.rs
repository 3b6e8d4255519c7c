use super::task_failure;
use crate::registry::JobField;
use crate::state_machine::ProcessState;
use crate::workflow::context::TaskContext;
use crate::workflow::errors::WorkflowResult;
use crate::workflow::task::ProcessTask;
use crate::workflow::types::{TaskResult, TaskType};
use async_trait::async_trait;

#[derive(Debug, Default)]
pub struct CompletingTask;

impl CompletingTask {
    async fn run(&self, context: &TaskContext) -> WorkflowResult<TaskResult> {
        for job in context
            .services
            .registry
            .get_jobs(JobField::ProcessId, context.process_id())
            .await?
        {
            context.services.job_tracker.untrack(&job.job_id);
        }
        context.transition_process(ProcessState::Completed, None).await?;
        context.log_step("Process completed");
        Ok(TaskResult::success())
    }
}

#[async_trait]
impl ProcessTask for CompletingTask {
    fn task_type(&self) -> TaskType {
        TaskType::Completing
    }

    async fn on_run(&self, context: &TaskContext) -> TaskResult {
        self.run(context)
            .await
            .unwrap_or_else(|e| task_failure(context, e))
    }
}
