use super::context::TaskContext;
use super::tasks::{
    ArchiveTask, CancelCompletingTask, CompletingTask, EnvSetupTask, InputDataStagingTask,
    JobSubmissionTask, JobVerificationTask, OutputDataStagingTask, ParsingTriggeringTask,
    RemoteJobCancellationTask, WorkflowCancellationTask,
};
use super::types::{TaskResult, TaskType};
use async_trait::async_trait;

/// One node of a process workflow
///
/// `on_run` may be invoked again for the same task after a crash or a
/// redelivery, so it must converge on the same end state when repeated.
#[async_trait]
pub trait ProcessTask: Send + Sync {
    fn task_type(&self) -> TaskType;

    async fn on_run(&self, context: &TaskContext) -> TaskResult;

    /// Called when the workflow is cancelled while this task ran
    async fn on_cancel(&self, context: &TaskContext) {
        context.log_step("Task cancelled");
    }
}

/// Builds task implementations from their type
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskFactory;

impl TaskFactory {
    pub fn create(&self, task_type: TaskType) -> Box<dyn ProcessTask> {
        match task_type {
            TaskType::EnvSetup => Box::new(EnvSetupTask),
            TaskType::InputDataStaging => Box::new(InputDataStagingTask),
            TaskType::JobSubmission => Box::new(JobSubmissionTask),
            TaskType::JobVerification => Box::new(JobVerificationTask),
            TaskType::OutputDataStaging => Box::new(OutputDataStagingTask),
            TaskType::Archive => Box::new(ArchiveTask),
            TaskType::Completing => Box::new(CompletingTask),
            TaskType::ParsingTriggering => Box::new(ParsingTriggeringTask),
            TaskType::WorkflowCancellation => Box::new(WorkflowCancellationTask),
            TaskType::RemoteJobCancellation => Box::new(RemoteJobCancellationTask),
            TaskType::CancelCompleting => Box::new(CancelCompletingTask),
        }
    }
}
