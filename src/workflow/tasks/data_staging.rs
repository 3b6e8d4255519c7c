use super::{file_name, join_path, local_path, task_failure};
use crate::models::DataStagingTaskModel;
use crate::state_machine::ProcessState;
use crate::workflow::context::TaskContext;
use crate::workflow::errors::{WorkflowError, WorkflowResult};
use crate::workflow::task::ProcessTask;
use crate::workflow::types::{TaskResult, TaskType};
use async_trait::async_trait;

fn staging_model(context: &TaskContext) -> WorkflowResult<DataStagingTaskModel> {
    context
        .task_model()
        .and_then(|task| task.data_staging.clone())
        .ok_or_else(|| WorkflowError::missing("data staging details", context.process_id()))
}

/// Copies URI inputs into the working directory
#[derive(Debug, Default)]
pub struct InputDataStagingTask;

impl InputDataStagingTask {
    async fn run(&self, context: &TaskContext) -> WorkflowResult<TaskResult> {
        let staging = staging_model(context)?;
        let Some(input) = context
            .process
            .process_inputs
            .iter()
            .find(|input| input.name == staging.data_name)
        else {
            return Err(WorkflowError::missing("process input", context.process_id()));
        };
        if !input.data_type.is_file() {
            return Ok(TaskResult::success_with(format!("{} is not a file input", input.name)));
        }

        context
            .transition_process(ProcessState::InputDataStaging, None)
            .await?;
        let working_dir = context.working_dir().await?;
        let adaptor = context.adaptor().await?;

        let sources: Vec<&str> = match staging.source.as_deref() {
            Some(source) => vec![source],
            None => input.values(),
        };
        if sources.is_empty() && input.is_required {
            return Ok(TaskResult::fail(format!("Required input {} has no value", input.name), false));
        }

        for source in sources {
            if context.is_cancelled() {
                return Ok(TaskResult::cancelled());
            }
            let source = local_path(source);
            let destination = match (&staging.destination, input.data_type) {
                (Some(destination), crate::models::DataType::Uri) => local_path(destination).to_string(),
                _ => join_path(&working_dir, file_name(source)),
            };
            if adaptor.file_exists(&destination).await? {
                continue;
            }
            adaptor.copy_file(source, &destination).await?;
            context.log_step(&format!("Staged {source} to {destination}"));
        }
        Ok(TaskResult::success())
    }
}

#[async_trait]
impl ProcessTask for InputDataStagingTask {
    fn task_type(&self) -> TaskType {
        TaskType::InputDataStaging
    }

    async fn on_run(&self, context: &TaskContext) -> TaskResult {
        self.run(context)
            .await
            .unwrap_or_else(|e| task_failure(context, e))
    }
}

/// Copies produced outputs to the experiment data directory
#[derive(Debug, Default)]
pub struct OutputDataStagingTask;

impl OutputDataStagingTask {
    async fn run(&self, context: &TaskContext) -> WorkflowResult<TaskResult> {
        let staging = staging_model(context)?;
        let Some(output) = context
            .process
            .process_outputs
            .iter()
            .find(|output| output.name == staging.data_name)
        else {
            return Err(WorkflowError::missing("process output", context.process_id()));
        };

        context
            .transition_process(ProcessState::OutputDataStaging, None)
            .await?;
        let working_dir = context.working_dir().await?;
        let Some(file) = output.value.as_deref().filter(|value| !value.trim().is_empty()) else {
            return Ok(TaskResult::success_with(format!("Output {} has no file name", output.name)));
        };
        let source = match staging.source.as_deref() {
            Some(source) => local_path(source).to_string(),
            None => join_path(&working_dir, file),
        };
        let destination_dir = match (&staging.destination, &context.process.experiment_data_dir) {
            (Some(destination), _) => local_path(destination).to_string(),
            (None, Some(data_dir)) => data_dir.clone(),
            (None, None) => {
                return Ok(TaskResult::success_with("No experiment data directory, output left in place"));
            }
        };

        let adaptor = context.adaptor().await?;
        if !adaptor.file_exists(&source).await? {
            if output.is_required {
                return Ok(TaskResult::fail(
                    format!("Required output {} was not produced at {source}", output.name),
                    false,
                ));
            }
            return Ok(TaskResult::success_with(format!("Optional output {} not produced", output.name)));
        }

        adaptor.create_directory(&destination_dir).await?;
        let destination = join_path(&destination_dir, file_name(&source));
        adaptor.copy_file(&source, &destination).await?;
        context.log_step(&format!("Staged output {source} to {destination}"));
        Ok(TaskResult::success())
    }
}

#[async_trait]
impl ProcessTask for OutputDataStagingTask {
    fn task_type(&self) -> TaskType {
        TaskType::OutputDataStaging
    }

    async fn on_run(&self, context: &TaskContext) -> TaskResult {
        self.run(context)
            .await
            .unwrap_or_else(|e| task_failure(context, e))
    }
}

/// Packs the working directory into the experiment data directory
#[derive(Debug, Default)]
pub struct ArchiveTask;

impl ArchiveTask {
    async fn run(&self, context: &TaskContext) -> WorkflowResult<TaskResult> {
        let staging = context.task_model().and_then(|task| task.data_staging.clone());
        let destination_dir = match (
            staging.and_then(|staging| staging.destination),
            &context.process.experiment_data_dir,
        ) {
            (Some(destination), _) => local_path(&destination).to_string(),
            (None, Some(data_dir)) => data_dir.clone(),
            (None, None) => return Ok(TaskResult::success_with("No archive destination configured")),
        };

        let working_dir = context.working_dir().await?;
        let adaptor = context.adaptor().await?;
        adaptor.create_directory(&destination_dir).await?;
        let archive = join_path(&destination_dir, &format!("{}.tar.gz", context.process_id()));
        let command = format!("tar -czf {archive} -C {working_dir} .");
        let output = adaptor.execute_command(&command, Some(&working_dir)).await?;
        if !output.is_success() {
            return Ok(TaskResult::fail(
                format!("Archiving failed with exit code {}: {}", output.exit_code, output.stderr.trim()),
                false,
            ));
        }
        context.log_step(&format!("Archived working directory to {archive}"));
        Ok(TaskResult::success())
    }
}

#[async_trait]
impl ProcessTask for ArchiveTask {
    fn task_type(&self) -> TaskType {
        TaskType::Archive
    }

    async fn on_run(&self, context: &TaskContext) -> TaskResult {
        self.run(context)
            .await
            .unwrap_or_else(|e| task_failure(context, e))
    }
}
