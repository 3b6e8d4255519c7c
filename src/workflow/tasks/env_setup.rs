use super::task_failure;
use crate::workflow::context::TaskContext;
use crate::workflow::errors::WorkflowResult;
use crate::workflow::task::ProcessTask;
use crate::workflow::types::{TaskResult, TaskType};
use crate::state_machine::ProcessState;
use async_trait::async_trait;

/// Creates the process working directory on the compute resource
#[derive(Debug, Default)]
pub struct EnvSetupTask;

impl EnvSetupTask {
    async fn run(&self, context: &TaskContext) -> WorkflowResult<TaskResult> {
        context
            .transition_process(ProcessState::ConfiguringWorkspace, None)
            .await?;
        let working_dir = context.working_dir().await?;
        let adaptor = context.adaptor().await?;
        adaptor.create_directory(&working_dir).await?;
        context.log_step(&format!("Working directory {working_dir} ready"));
        Ok(TaskResult::success())
    }
}

#[async_trait]
impl ProcessTask for EnvSetupTask {
    fn task_type(&self) -> TaskType {
        TaskType::EnvSetup
    }

    async fn on_run(&self, context: &TaskContext) -> TaskResult {
        self.run(context)
            .await
            .unwrap_or_else(|e| task_failure(context, e))
    }
}
