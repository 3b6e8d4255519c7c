use super::{file_name, join_path, task_failure};
use crate::adaptor::JobDescriptor;
use crate::constants::reasons;
use crate::messaging::{EventPublisher, JobIdentifier};
use crate::models::{JobModel, JobStatus, ProcessModel};
use crate::monitor::TrackedJob;
use crate::registry::JobField;
use crate::state_machine::{JobState, ProcessState};
use crate::workflow::context::TaskContext;
use crate::workflow::errors::{WorkflowError, WorkflowResult};
use crate::workflow::task::ProcessTask;
use crate::workflow::types::{TaskResult, TaskType};
use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

/// Writes the batch script, submits it and registers the job for monitoring
///
/// A job already recorded for this task is reused, so a redelivered
/// submission does not start a second remote job.
#[derive(Debug, Default)]
pub struct JobSubmissionTask;

fn job_arguments(process: &ProcessModel) -> Vec<String> {
    let mut inputs: Vec<_> = process.process_inputs.iter().collect();
    inputs.sort_by_key(|input| input.input_order);

    let mut arguments = Vec::new();
    for input in inputs {
        let values = input.values();
        if values.is_empty() {
            continue;
        }
        if let Some(flag) = input.application_argument.as_deref().filter(|flag| !flag.is_empty()) {
            arguments.push(flag.to_string());
        }
        for value in values {
            if input.data_type.is_file() {
                arguments.push(file_name(value).to_string());
            } else {
                arguments.push(value.to_string());
            }
        }
    }
    arguments
}

impl JobSubmissionTask {
    async fn existing_job(&self, context: &TaskContext) -> WorkflowResult<Option<JobModel>> {
        let jobs = context
            .services
            .registry
            .get_jobs(JobField::TaskId, &context.task_id)
            .await?;
        Ok(jobs
            .into_iter()
            .find(|job| job.process_id == context.process_id()))
    }

    fn track(&self, context: &TaskContext, job: &JobModel, compute_resource_id: &str, manager: crate::models::JobManagerType) {
        context.services.job_tracker.track(TrackedJob {
            job_id: job.job_id.clone(),
            job_name: job.job_name.clone(),
            task_id: job.task_id.clone(),
            process_id: context.identity.process_id.clone(),
            experiment_id: context.identity.experiment_id.clone(),
            gateway_id: context.identity.gateway_id.clone(),
            compute_resource_id: compute_resource_id.to_string(),
            job_manager: manager,
            last_state: job.current_state().or(Some(JobState::Submitted)),
            consecutive_failures: 0,
        });
    }

    async fn run(&self, context: &TaskContext) -> WorkflowResult<TaskResult> {
        let resource = context.compute_resource().await?;

        if let Some(job) = self.existing_job(context).await? {
            info!(
                process_id = %context.process_id(),
                job_id = %job.job_id,
                "Job already submitted for task, reusing it"
            );
            if job.is_live() {
                self.track(context, &job, &resource.compute_resource_id, resource.job_manager);
            }
            context.transition_process(ProcessState::Executing, None).await?;
            return Ok(TaskResult::success_with(format!("Reused job {}", job.job_id)));
        }

        if context.is_cancelled() {
            return Ok(TaskResult::cancelled());
        }

        let process = &context.process;
        let deployment_id = process
            .application_deployment_id
            .as_deref()
            .ok_or_else(|| WorkflowError::missing("application deployment id", context.process_id()))?;
        let deployment = context
            .services
            .registry
            .get_application_deployment(deployment_id)
            .await?
            .ok_or_else(|| WorkflowError::missing("application deployment", context.process_id()))?;

        let working_dir = context.working_dir().await?;
        let job_name = format!("A{}", &Uuid::new_v4().simple().to_string()[..10]);
        let schedule = &process.resource_schedule;
        let queue_name = schedule.queue_name.clone();
        let max_wall_time = match (schedule.wall_time_limit, queue_name.as_deref().and_then(|q| resource.queue(q))) {
            (0, Some(queue)) => queue.max_run_time,
            (limit, _) => limit,
        };

        let descriptor = JobDescriptor {
            job_name: job_name.clone(),
            working_directory: working_dir.clone(),
            executable_path: deployment.executable_path.clone(),
            input_arguments: job_arguments(process),
            standard_out_file: join_path(&working_dir, &format!("{job_name}.stdout")),
            standard_error_file: join_path(&working_dir, &format!("{job_name}.stderr")),
            node_count: schedule.node_count,
            cpu_count: schedule.total_cpu_count,
            queue_name,
            max_wall_time_minutes: max_wall_time,
            allocation_project: None,
            module_load_commands: deployment.module_load_commands.clone(),
            pre_job_commands: deployment.pre_job_commands.clone(),
            post_job_commands: deployment.post_job_commands.clone(),
        };
        let manager = resource.job_manager;
        let script = manager.generate_script(&descriptor);
        let script_path = join_path(&working_dir, manager.script_file_name());

        let adaptor = context.adaptor().await?;
        adaptor.write_file(&script_path, &script).await?;

        if context.is_cancelled() {
            return Ok(TaskResult::cancelled());
        }
        let output = adaptor
            .execute_command(&manager.submit_command(&working_dir, &script_path), Some(&working_dir))
            .await?;
        let job_id = manager.parse_submit_output(&output)?;

        let mut job = JobModel::new(&job_id, &job_name, context.process_id(), &context.task_id);
        job.job_description = script;
        job.compute_resource_id = Some(resource.compute_resource_id.clone());
        job.working_dir = Some(working_dir);
        job.std_out = Some(descriptor.standard_out_file);
        job.std_err = Some(descriptor.standard_error_file);

        let registry = &context.services.registry;
        registry.add_job(job.clone()).await?;
        registry
            .add_job_status(&job_id, &context.task_id, JobStatus::with_reason(JobState::Submitted, reasons::JOB_SUBMITTED))
            .await?;

        let identity = JobIdentifier {
            job_id: job_id.clone(),
            task_id: context.task_id.clone(),
            process_id: context.identity.process_id.clone(),
            experiment_id: context.identity.experiment_id.clone(),
            gateway_id: context.identity.gateway_id.clone(),
        };
        let message = EventPublisher::job_status_message(&identity, JobState::Submitted);
        let config = &context.services.config;
        if let Err(e) = context
            .services
            .publisher
            .publish_with_retry(&message, config.monitor.publish_retries, &config.executor.backoff)
            .await
        {
            warn!(job_id = %job_id, error = %e, "Failed to publish job submission status");
        }

        self.track(context, &job, &resource.compute_resource_id, manager);
        crate::logging::log_job_status(&job_id, context.process_id(), &JobState::Submitted.to_string());
        context.transition_process(ProcessState::Executing, None).await?;
        Ok(TaskResult::success_with(format!("Submitted job {job_id}")))
    }
}

#[async_trait]
impl ProcessTask for JobSubmissionTask {
    fn task_type(&self) -> TaskType {
        TaskType::JobSubmission
    }

    async fn on_run(&self, context: &TaskContext) -> TaskResult {
        self.run(context)
            .await
            .unwrap_or_else(|e| task_failure(context, e))
    }
}
