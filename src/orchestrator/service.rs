//! # Orchestrator Service
//!
//! Launch, validation and termination of experiments and processes. Calls
//! return once the request is validated; the remaining work is handed to a
//! [`BoundedWorkerPool`] and reaches the workflow manager as
//! `ProcessSubmitEvent`s on the process launch exchange.
//!
//! The service also listens on two queues:
//! - process status changes, which it folds into the experiment status;
//! - experiment launch and cancel requests.

use super::pool::BoundedWorkerPool;
use super::validation::{LaunchValidator, ValidationResults};
use super::OrchestratorApi;
use crate::config::OrchestratorConfig;
use crate::constants::{messaging as keys, reasons, ORCHESTRATOR_API_VERSION};
use crate::error::{OrchestratorError, Result};
use crate::messaging::{
    Delivery, EventPublisher, MessageBus, MessageContext, MessageEvent, ProcessStatusChangeEvent,
    ProcessSubmitEvent, ProcessTerminateEvent,
};
use crate::models::{
    DataStageType, DataStagingTaskModel, ErrorModel, ExperimentModel, ExperimentType, ProcessModel,
    TaskModel, TaskTypes,
};
use crate::registry::RegistryClient;
use crate::state_machine::{ExperimentState, ExperimentStateMachine, ProcessState};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

const RECEIVE_TIMEOUT: Duration = Duration::from_millis(200);

struct ServiceInner {
    registry: Arc<dyn RegistryClient>,
    bus: Arc<dyn MessageBus>,
    launch_publisher: EventPublisher,
    experiment_state: ExperimentStateMachine,
    validator: LaunchValidator,
    pool: Arc<BoundedWorkerPool>,
    config: Arc<OrchestratorConfig>,
}

#[derive(Clone)]
pub struct OrchestratorService {
    inner: Arc<ServiceInner>,
}

impl std::fmt::Debug for OrchestratorService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorService")
            .field("gateway_id", &self.inner.config.gateway_id)
            .field("pool", &self.inner.pool)
            .finish()
    }
}

impl OrchestratorService {
    pub fn new(
        registry: Arc<dyn RegistryClient>,
        bus: Arc<dyn MessageBus>,
        pool: Arc<BoundedWorkerPool>,
        config: Arc<OrchestratorConfig>,
    ) -> Self {
        let status_publisher = EventPublisher::new(Arc::clone(&bus), config.messaging.status_exchange.clone());
        let launch_publisher =
            EventPublisher::new(Arc::clone(&bus), config.messaging.process_launch_exchange.clone());
        let experiment_state = ExperimentStateMachine::new(
            Arc::clone(&registry),
            status_publisher,
            config.monitor.publish_retries,
            config.executor.backoff.clone(),
        );
        Self {
            inner: Arc::new(ServiceInner {
                validator: LaunchValidator::new(Arc::clone(&registry)),
                registry,
                bus,
                launch_publisher,
                experiment_state,
                pool,
                config,
            }),
        }
    }

    pub fn pool(&self) -> &Arc<BoundedWorkerPool> {
        &self.inner.pool
    }

    async fn load_experiment(&self, experiment_id: &str) -> Result<ExperimentModel> {
        self.inner
            .registry
            .get_experiment(experiment_id)
            .await?
            .ok_or_else(|| OrchestratorError::ExperimentNotFound(experiment_id.to_string()))
    }

    async fn set_experiment_state(
        &self,
        experiment_id: &str,
        gateway_id: &str,
        state: ExperimentState,
        reason: &str,
    ) -> Result<()> {
        self.inner
            .experiment_state
            .transition(experiment_id, gateway_id, state, Some(reason))
            .await?;
        Ok(())
    }

    /// Status write that must not mask the error being reported
    async fn fail_experiment(&self, experiment_id: &str, gateway_id: &str, reason: &str) {
        if let Err(e) = self
            .set_experiment_state(experiment_id, gateway_id, ExperimentState::Failed, reason)
            .await
        {
            error!(experiment_id, error = %e, "Failed to mark experiment FAILED");
        }
    }

    /// Credential token for an experiment
    ///
    /// A token configured for the selected compute resource wins over the
    /// group resource profile default.
    pub async fn get_credential_token(&self, experiment: &ExperimentModel) -> Result<String> {
        let config = &experiment.user_configuration;
        let profile_id = config.group_resource_profile_id.as_deref().ok_or_else(|| {
            OrchestratorError::configuration(format!(
                "Experiment not configured with a group resource profile: {}",
                experiment.experiment_id
            ))
        })?;
        let profile = self
            .inner
            .registry
            .get_group_resource_profile(profile_id)
            .await?
            .ok_or_else(|| OrchestratorError::configuration(format!("Group resource profile {profile_id} not found")))?;

        profile
            .credential_token_for(config.resource_host_id.as_deref())
            .map(str::to_string)
            .ok_or_else(|| {
                OrchestratorError::configuration(
                    "No credential store token configured at the group resource profile or compute resource preference",
                )
            })
    }

    /// Validate each process, recording the first failure as an experiment error
    async fn first_failed_validation(
        &self,
        experiment: &ExperimentModel,
        processes: &[ProcessModel],
    ) -> Result<Option<ValidationResults>> {
        for process in processes {
            let results = self.inner.validator.validate_process(experiment, process).await?;
            if !results.validation_state {
                let summary = results.summary();
                warn!(
                    experiment_id = %experiment.experiment_id,
                    process_id = %process.process_id,
                    failures = %summary,
                    "Process validation failed"
                );
                let error = ErrorModel::new(format!("{}: {summary}", reasons::LAUNCH_VALIDATION_FAILED))
                    .with_user_message(summary);
                self.inner
                    .registry
                    .add_experiment_error(&experiment.experiment_id, error)
                    .await?;
                return Ok(Some(results));
            }
        }
        Ok(None)
    }

    async fn launch_experiment_internal(&self, experiment_id: &str, gateway_id: &str) -> Result<bool> {
        let experiment = self.load_experiment(experiment_id).await?;
        let token = self.get_credential_token(&experiment).await?;
        if experiment.experiment_type == ExperimentType::Workflow {
            return Err(OrchestratorError::InvalidRequest(format!(
                "Experiment {experiment_id} is a workflow experiment, only single application experiments are supported"
            )));
        }

        let mut processes = self
            .inner
            .registry
            .get_processes_for_experiment(experiment_id)
            .await?;
        if processes.is_empty() {
            let process = build_process(&experiment);
            self.inner.registry.add_process(process.clone()).await?;
            processes.push(process);
        }

        if self.inner.config.orchestrator.enable_validation {
            if let Some(results) = self.first_failed_validation(&experiment, &processes).await? {
                return Err(OrchestratorError::LaunchValidation {
                    message: format!("Validating process fails for given experiment Id : {experiment_id}"),
                    results,
                });
            }
        }

        self.set_experiment_state(
            experiment_id,
            gateway_id,
            ExperimentState::Launched,
            reasons::SUBMITTED_ALL_PROCESSES,
        )
        .await?;
        info!(experiment_id, processes = processes.len(), "🧪 EXPERIMENT: Launched");

        let service = self.clone();
        let experiment_id_owned = experiment_id.to_string();
        let gateway_id_owned = gateway_id.to_string();
        let process_ids: Vec<String> = processes.into_iter().map(|p| p.process_id).collect();
        self.inner
            .pool
            .submit(async move {
                service
                    .launch_processes(&experiment_id_owned, &gateway_id_owned, &process_ids, &token)
                    .await;
            })
            .await?;
        Ok(true)
    }

    /// Pool job for an experiment launch; a failed process fails the experiment
    async fn launch_processes(&self, experiment_id: &str, gateway_id: &str, process_ids: &[String], token: &str) {
        for process_id in process_ids {
            let launched = match self.prepare_process(process_id).await {
                Ok(Some(process)) => self.submit_process(&process, token, gateway_id).await.map(|_| true),
                Ok(None) => Ok(false),
                Err(e) => Err(e),
            };
            if let Err(e) = launched {
                error!(experiment_id, process_id, error = %e, "Error while launching processes");
                self.fail_experiment(experiment_id, gateway_id, "Error while launching processes")
                    .await;
                return;
            }
        }
    }

    /// Resolve deployment and compute resource for a launchable process
    ///
    /// `None` means the process was already launched.
    async fn prepare_process(&self, process_id: &str) -> Result<Option<ProcessModel>> {
        let state = self
            .inner
            .registry
            .get_process_status(process_id)
            .await?
            .map(|status| status.state);
        match state {
            Some(state) if state.is_launchable() => {}
            None => return Err(OrchestratorError::ProcessNotFound(process_id.to_string())),
            Some(state) => {
                warn!(process_id, state = %state, "Process is already launched, it can not be relaunched");
                return Ok(None);
            }
        }

        let mut process = self
            .inner
            .registry
            .get_process(process_id)
            .await?
            .ok_or_else(|| OrchestratorError::ProcessNotFound(process_id.to_string()))?;
        let application_id = process.application_interface_id.clone().ok_or_else(|| {
            OrchestratorError::InvalidRequest(format!(
                "Application interface id of process {process_id} shouldn't be null"
            ))
        })?;
        let compute_resource_id = process
            .resource_schedule
            .resource_host_id
            .clone()
            .or_else(|| process.compute_resource_id.clone())
            .ok_or_else(|| OrchestratorError::InvalidRequest(format!("Process {process_id} has no compute resource")))?;

        let deployment = self
            .inner
            .registry
            .find_application_deployment(&application_id, &compute_resource_id)
            .await?
            .ok_or_else(|| {
                OrchestratorError::configuration(format!(
                    "Could not find an application deployment for {compute_resource_id} and application {application_id}"
                ))
            })?;
        process.application_deployment_id = Some(deployment.app_deployment_id);
        process.compute_resource_id = Some(compute_resource_id);
        self.inner.registry.update_process(process.clone()).await?;
        Ok(Some(process))
    }

    async fn submit_process(&self, process: &ProcessModel, token: &str, gateway_id: &str) -> Result<()> {
        let event = MessageEvent::ProcessSubmit(ProcessSubmitEvent {
            process_id: process.process_id.clone(),
            experiment_id: process.experiment_id.clone(),
            gateway_id: gateway_id.to_string(),
            token_id: token.to_string(),
        });
        let config = &self.inner.config;
        self.inner
            .launch_publisher
            .publish_with_retry(
                &MessageContext::new(event, gateway_id),
                config.monitor.publish_retries,
                &config.executor.backoff,
            )
            .await?;
        crate::logging::log_process_operation(
            "launch",
            &process.process_id,
            Some(&process.experiment_id),
            "submitted",
            None,
        );
        Ok(())
    }

    async fn try_terminate(&self, experiment_id: &str, gateway_id: &str) -> Result<bool> {
        let Some(status) = self.inner.registry.get_experiment_status(experiment_id).await? else {
            warn!(experiment_id, "Experiment has no status, nothing to terminate");
            return Ok(false);
        };
        match status.state {
            ExperimentState::Completed
            | ExperimentState::Canceled
            | ExperimentState::Failed
            | ExperimentState::Canceling => {
                warn!(experiment_id, state = %status.state, "Can't terminate already finished or cancelling experiment");
                return Ok(false);
            }
            ExperimentState::Created => {
                warn!(experiment_id, "Experiment termination is only allowed for launched experiments");
                return Ok(false);
            }
            _ => {}
        }

        let experiment = self.load_experiment(experiment_id).await?;
        let token = match self.get_credential_token(&experiment).await {
            Ok(token) => token,
            Err(e) => {
                error!(experiment_id, error = %e, "Cannot terminate without a credential token");
                return Ok(false);
            }
        };

        self.set_experiment_state(
            experiment_id,
            gateway_id,
            ExperimentState::Canceling,
            reasons::CANCEL_REQUESTED,
        )
        .await?;

        let config = &self.inner.config;
        for process in self
            .inner
            .registry
            .get_processes_for_experiment(experiment_id)
            .await?
        {
            if process.current_state().is_some_and(|state| state.is_terminal()) {
                continue;
            }
            let event = MessageEvent::ProcessTerminate(ProcessTerminateEvent {
                process_id: process.process_id.clone(),
                gateway_id: gateway_id.to_string(),
                token_id: token.clone(),
            });
            self.inner
                .launch_publisher
                .publish_with_retry(
                    &MessageContext::new(event, gateway_id),
                    config.monitor.publish_retries,
                    &config.executor.backoff,
                )
                .await?;
            info!(experiment_id, process_id = %process.process_id, "🧪 EXPERIMENT: Process termination requested");
        }
        Ok(true)
    }

    /// Fold a process status change into the experiment status
    ///
    /// Returns the experiment state that was written, if any.
    #[instrument(skip(self, event), fields(process_id = %event.process_identity.process_id, state = %event.state))]
    pub async fn handle_process_status_change(
        &self,
        event: &ProcessStatusChangeEvent,
    ) -> Result<Option<ExperimentState>> {
        let identity = &event.process_identity;
        let process = self
            .inner
            .registry
            .get_process(&identity.process_id)
            .await?
            .ok_or_else(|| OrchestratorError::ProcessNotFound(identity.process_id.clone()))?;
        if process
            .tasks
            .iter()
            .any(|task| task.task_type == TaskTypes::OutputFetching)
        {
            debug!("Not updating experiment status for an output fetching process");
            return Ok(None);
        }

        let experiment_state = self
            .inner
            .registry
            .get_experiment_status(&identity.experiment_id)
            .await?
            .map(|status| status.state);
        let cancelling = experiment_state == Some(ExperimentState::Canceling);

        let (next, reason) = match event.state {
            ProcessState::Started if cancelling => (
                ExperimentState::Canceling,
                "Process started but experiment cancelling is triggered",
            ),
            ProcessState::Started => (ExperimentState::Executing, "process started"),
            ProcessState::Completed if cancelling => (
                ExperimentState::Canceled,
                "Process completed but experiment cancelling is triggered",
            ),
            ProcessState::Completed => (ExperimentState::Completed, "process completed"),
            ProcessState::Failed if cancelling => (
                ExperimentState::Canceled,
                "Process failed but experiment cancelling is triggered",
            ),
            ProcessState::Failed => (ExperimentState::Failed, "process failed"),
            ProcessState::Canceled => (ExperimentState::Canceled, "process cancelled"),
            ProcessState::Queued => (
                ExperimentState::Scheduled,
                "Process started but compute resource not available",
            ),
            ProcessState::Requeued => (
                ExperimentState::Scheduled,
                "Job submission failed, requeued to resubmit",
            ),
            _ => return Ok(None),
        };

        self.set_experiment_state(&identity.experiment_id, &identity.gateway_id, next, reason)
            .await?;
        Ok(Some(next))
    }

    /// Handle an experiment launch or cancel message
    ///
    /// A redelivered launch only goes ahead while the experiment is still
    /// CREATED.
    pub async fn handle_launch_message(&self, message: &MessageContext, redelivered: bool) -> Result<()> {
        match &message.event {
            MessageEvent::ExperimentSubmit(event) => {
                let experiment = self.load_experiment(&event.experiment_id).await?;
                if experiment.current_state() != Some(ExperimentState::Created) {
                    debug!(
                        experiment_id = %event.experiment_id,
                        redelivered,
                        "Experiment already launched, skipping launch message"
                    );
                    return Ok(());
                }
                self.launch_experiment(&event.experiment_id, &event.gateway_id)
                    .await?;
                Ok(())
            }
            MessageEvent::ExperimentCancel(event) => {
                self.terminate_experiment(&event.experiment_id, &event.gateway_id)
                    .await?;
                Ok(())
            }
            other => Err(OrchestratorError::InvalidRequest(format!(
                "Unexpected {:?} message on the experiment queue",
                other.message_type()
            ))),
        }
    }

    async fn settle(&self, delivery: &Delivery, result: Result<()>) {
        let settled = match result {
            Ok(()) => self.inner.bus.ack(delivery).await,
            Err(e) if e.is_validation() => {
                warn!(queue = %delivery.queue, error = %e, "Dropping invalid message");
                self.inner.bus.ack(delivery).await
            }
            Err(OrchestratorError::Registry(e)) if e.is_transient() => {
                warn!(queue = %delivery.queue, error = %e, "Registry unavailable, requeueing message");
                self.inner.bus.nack(delivery, true).await
            }
            Err(e) => {
                error!(queue = %delivery.queue, error = %e, "Message handling failed");
                self.inner.bus.ack(delivery).await
            }
        };
        if let Err(e) = settled {
            error!(queue = %delivery.queue, error = %e, "Failed to settle message");
        }
    }

    async fn consume<F, Fut>(&self, queue: &str, shutdown: CancellationToken, handler: F) -> Result<()>
    where
        F: Fn(MessageContext, bool) -> Fut,
        Fut: std::future::Future<Output = Result<()>>,
    {
        loop {
            let received = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = self.inner.bus.receive(queue, RECEIVE_TIMEOUT) => received,
            };
            let delivery = match received {
                Ok(Some(delivery)) => delivery,
                Ok(None) => continue,
                Err(e) => {
                    warn!(queue, error = %e, "Receive failed");
                    tokio::time::sleep(RECEIVE_TIMEOUT).await;
                    continue;
                }
            };
            let result = match delivery.message() {
                Ok(message) => handler(message, delivery.redelivered).await,
                Err(e) => Err(OrchestratorError::InvalidRequest(e.to_string())),
            };
            self.settle(&delivery, result).await;
        }
        info!(queue, "🧪 EXPERIMENT: Listener stopped");
        Ok(())
    }

    /// Consume process status changes until `shutdown` fires
    pub async fn run_status_listener(&self, shutdown: CancellationToken) -> Result<()> {
        self.inner
            .bus
            .declare_queue(
                keys::ORCHESTRATOR_STATUS_QUEUE,
                &self.inner.config.messaging.status_exchange,
                &[keys::PROCESS_STATUS_BINDING.to_string()],
            )
            .await?;
        info!(queue = keys::ORCHESTRATOR_STATUS_QUEUE, "🧪 EXPERIMENT: Status listener started");
        self.consume(keys::ORCHESTRATOR_STATUS_QUEUE, shutdown, |message, _| async move {
            match &message.event {
                MessageEvent::ProcessStatusChange(event) => {
                    self.handle_process_status_change(event).await.map(|_| ())
                }
                other => {
                    debug!(message_type = ?other.message_type(), "Ignoring non-process status message");
                    Ok(())
                }
            }
        })
        .await
    }

    /// Consume experiment launch and cancel requests until `shutdown` fires
    pub async fn run_experiment_listener(&self, shutdown: CancellationToken) -> Result<()> {
        self.inner
            .bus
            .declare_queue(
                keys::EXPERIMENT_LAUNCH_QUEUE,
                &self.inner.config.messaging.experiment_exchange,
                &[
                    keys::EXPERIMENT_LAUNCH_ROUTING_KEY.to_string(),
                    keys::EXPERIMENT_CANCEL_ROUTING_KEY.to_string(),
                ],
            )
            .await?;
        info!(queue = keys::EXPERIMENT_LAUNCH_QUEUE, "🧪 EXPERIMENT: Launch listener started");
        self.consume(keys::EXPERIMENT_LAUNCH_QUEUE, shutdown, |message, redelivered| async move {
            self.handle_launch_message(&message, redelivered).await
        })
        .await
    }
}

#[async_trait]
impl OrchestratorApi for OrchestratorService {
    #[instrument(skip(self))]
    async fn launch_experiment(&self, experiment_id: &str, gateway_id: &str) -> Result<bool> {
        match self.launch_experiment_internal(experiment_id, gateway_id).await {
            Ok(launched) => Ok(launched),
            Err(OrchestratorError::ExperimentNotFound(id)) => Err(OrchestratorError::ExperimentNotFound(id)),
            Err(e) => {
                let reason = match &e {
                    OrchestratorError::LaunchValidation { message, .. } => format!("Validation failed: {message}"),
                    other => other.to_string(),
                };
                self.fail_experiment(experiment_id, gateway_id, &reason).await;
                Err(e)
            }
        }
    }

    #[instrument(skip(self, credential_token))]
    async fn launch_process(&self, process_id: &str, credential_token: &str, gateway_id: &str) -> Result<bool> {
        let Some(process) = self.prepare_process(process_id).await? else {
            return Ok(false);
        };
        let service = self.clone();
        let token = credential_token.to_string();
        let gateway_id = gateway_id.to_string();
        self.inner
            .pool
            .submit(async move {
                if let Err(e) = service.submit_process(&process, &token, &gateway_id).await {
                    error!(process_id = %process.process_id, error = %e, "Failed to submit process");
                }
            })
            .await?;
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn terminate_experiment(&self, experiment_id: &str, gateway_id: &str) -> Result<bool> {
        info!(experiment_id, "🧪 EXPERIMENT: Cancelling");
        match self.try_terminate(experiment_id, gateway_id).await {
            Ok(terminated) => Ok(terminated),
            Err(e) => {
                error!(experiment_id, error = %e, "Experiment termination failed");
                Ok(false)
            }
        }
    }

    async fn validate_experiment(&self, experiment_id: &str) -> Result<bool> {
        let experiment = self.load_experiment(experiment_id).await?;
        let results = self.inner.validator.validate_experiment(&experiment).await?;
        if !results.validation_state {
            info!(experiment_id, failures = %results.summary(), "🧪 EXPERIMENT: Validation failed");
        }
        Ok(results.validation_state)
    }

    async fn validate_process(&self, experiment_id: &str, processes: &[ProcessModel]) -> Result<bool> {
        let experiment = self.load_experiment(experiment_id).await?;
        Ok(self
            .first_failed_validation(&experiment, processes)
            .await?
            .is_none())
    }

    fn get_api_version(&self) -> &'static str {
        ORCHESTRATOR_API_VERSION
    }
}

/// Single process for an experiment, with its task DAG
pub(crate) fn build_process(experiment: &ExperimentModel) -> ProcessModel {
    let config = &experiment.user_configuration;
    let mut process = ProcessModel::new(&experiment.experiment_id, &experiment.gateway_id);
    process.user_name = experiment.user_name.clone();
    process.application_interface_id = experiment.execution_id.clone();
    process.compute_resource_id = config.resource_host_id.clone();
    process.group_resource_profile_id = config.group_resource_profile_id.clone();
    process.experiment_data_dir = config.experiment_data_dir.clone();
    process.process_inputs = experiment.experiment_inputs.clone();
    process.process_outputs = experiment.experiment_outputs.clone();
    process.resource_schedule.resource_host_id = config.resource_host_id.clone();
    process.resource_schedule.queue_name = config.queue_name.clone();
    process.resource_schedule.node_count = config.node_count;
    process.resource_schedule.total_cpu_count = config.total_cpu_count;
    process.resource_schedule.wall_time_limit = config.wall_time_limit;

    let process_id = process.process_id.clone();
    let task_id = |label: &str| format!("{label}_{}", Uuid::new_v4().simple());
    let staging = |stage_type: DataStageType, name: &str| {
        TaskModel::new(task_id("DATA_STAGING"), &process_id, TaskTypes::DataStaging).with_data_staging(
            DataStagingTaskModel {
                stage_type,
                data_name: name.to_string(),
                source: None,
                destination: None,
            },
        )
    };

    let mut tasks = vec![TaskModel::new(task_id("ENV_SETUP"), &process_id, TaskTypes::EnvSetup)];
    tasks.extend(
        process
            .process_inputs
            .iter()
            .filter(|input| input.data_type.is_file())
            .map(|input| staging(DataStageType::Input, &input.name)),
    );
    tasks.push(TaskModel::new(task_id("JOB_SUBMISSION"), &process_id, TaskTypes::JobSubmission));
    tasks.extend(
        process
            .process_outputs
            .iter()
            .filter(|output| output.data_type.is_file())
            .map(|output| staging(DataStageType::Output, &output.name)),
    );
    if process.experiment_data_dir.is_some() {
        tasks.push(staging(DataStageType::ArchiveOutput, "archive"));
    }

    process.task_dag = Some(
        tasks
            .iter()
            .map(|task| task.task_id.as_str())
            .collect::<Vec<_>>()
            .join(","),
    );
    process.tasks = tasks;
    process
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InputDataObject, OutputDataObject};
    use crate::test_helpers::{launchable_process, TestHarness, EXPERIMENT_ID, GATEWAY_ID};

    fn launch_events(harness: &TestHarness) -> Vec<MessageEvent> {
        harness
            .bus
            .published_to(&harness.config.messaging.process_launch_exchange)
            .into_iter()
            .map(|message| message.event)
            .collect()
    }

    async fn set_experiment(harness: &TestHarness, state: ExperimentState) {
        harness
            .registry
            .update_experiment_status(EXPERIMENT_ID, crate::models::ExperimentStatus::new(state))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_launch_experiment_creates_process_and_publishes_submit() {
        let harness = TestHarness::new();
        harness.seed_experiment();
        let service = harness.orchestrator();

        assert!(service.launch_experiment(EXPERIMENT_ID, GATEWAY_ID).await.unwrap());
        service.pool().shutdown().await;

        let processes = harness
            .registry
            .get_processes_for_experiment(EXPERIMENT_ID)
            .await
            .unwrap();
        assert_eq!(processes.len(), 1);
        assert_eq!(processes[0].application_deployment_id.as_deref(), Some("deployment-1"));
        assert_eq!(
            harness.registry.experiment_states(EXPERIMENT_ID).last(),
            Some(&ExperimentState::Launched)
        );

        let events = launch_events(&harness);
        assert_eq!(events.len(), 1);
        let MessageEvent::ProcessSubmit(event) = &events[0] else {
            panic!("expected a process submit event, got {events:?}");
        };
        assert_eq!(event.process_id, processes[0].process_id);
        assert_eq!(event.token_id, "token-1");
    }

    #[tokio::test]
    async fn test_launch_validation_failure_marks_experiment_failed() {
        let harness = TestHarness::new();
        let mut experiment = harness.seed_experiment();
        experiment.user_configuration.wall_time_limit = 500;
        harness.registry.insert_experiment(experiment);
        let service = harness.orchestrator();

        let error = service
            .launch_experiment(EXPERIMENT_ID, GATEWAY_ID)
            .await
            .unwrap_err();

        let results = match error {
            OrchestratorError::LaunchValidation { results, .. } => results,
            other => panic!("expected a validation error, got {other:?}"),
        };
        assert_eq!(results.failures().count(), 1);
        assert_eq!(
            harness.registry.experiment_states(EXPERIMENT_ID).last(),
            Some(&ExperimentState::Failed)
        );
        let stored = harness.registry.get_experiment(EXPERIMENT_ID).await.unwrap().unwrap();
        assert_eq!(stored.errors.len(), 1);
        assert!(launch_events(&harness).is_empty());
    }

    #[tokio::test]
    async fn test_launch_unknown_experiment_is_not_found() {
        let harness = TestHarness::new();
        let service = harness.orchestrator();
        let error = service.launch_experiment("missing", GATEWAY_ID).await.unwrap_err();
        assert!(matches!(error, OrchestratorError::ExperimentNotFound(_)));
    }

    #[tokio::test]
    async fn test_launch_process_rejects_already_started_process() {
        let harness = TestHarness::new();
        let process = launchable_process(&harness).await;
        harness.set_process_state(&process, ProcessState::Started).await;
        let service = harness.orchestrator();

        let launched = service
            .launch_process(&process.process_id, "token-1", GATEWAY_ID)
            .await
            .unwrap();
        service.pool().shutdown().await;

        assert!(!launched);
        assert!(launch_events(&harness).is_empty());
    }

    #[tokio::test]
    async fn test_terminate_requires_a_launched_experiment() {
        let harness = TestHarness::new();
        harness.seed_experiment();
        let service = harness.orchestrator();

        assert!(!service.terminate_experiment(EXPERIMENT_ID, GATEWAY_ID).await.unwrap());
        assert!(!service.terminate_experiment("missing", GATEWAY_ID).await.unwrap());
    }

    #[tokio::test]
    async fn test_terminate_publishes_for_live_processes() {
        let harness = TestHarness::new();
        let process = launchable_process(&harness).await;
        set_experiment(&harness, ExperimentState::Executing).await;
        let service = harness.orchestrator();

        assert!(service.terminate_experiment(EXPERIMENT_ID, GATEWAY_ID).await.unwrap());

        assert_eq!(
            harness.registry.experiment_states(EXPERIMENT_ID).last(),
            Some(&ExperimentState::Canceling)
        );
        let events = launch_events(&harness);
        assert!(matches!(
            events.as_slice(),
            [MessageEvent::ProcessTerminate(event)] if event.process_id == process.process_id
        ));
        // Second request while cancelling is refused.
        assert!(!service.terminate_experiment(EXPERIMENT_ID, GATEWAY_ID).await.unwrap());
    }

    #[tokio::test]
    async fn test_process_status_maps_to_experiment_status() {
        let harness = TestHarness::new();
        let process = launchable_process(&harness).await;
        set_experiment(&harness, ExperimentState::Launched).await;
        let service = harness.orchestrator();
        let event = |state| ProcessStatusChangeEvent {
            state,
            process_identity: crate::messaging::ProcessIdentifier::new(
                &process.process_id,
                EXPERIMENT_ID,
                GATEWAY_ID,
            ),
        };

        let written = service
            .handle_process_status_change(&event(ProcessState::Queued))
            .await
            .unwrap();
        assert_eq!(written, Some(ExperimentState::Scheduled));
        let written = service
            .handle_process_status_change(&event(ProcessState::Started))
            .await
            .unwrap();
        assert_eq!(written, Some(ExperimentState::Executing));
        let written = service
            .handle_process_status_change(&event(ProcessState::Executing))
            .await
            .unwrap();
        assert_eq!(written, None);

        set_experiment(&harness, ExperimentState::Canceling).await;
        let written = service
            .handle_process_status_change(&event(ProcessState::Completed))
            .await
            .unwrap();
        assert_eq!(written, Some(ExperimentState::Canceled));
        assert_eq!(
            harness.registry.experiment_states(EXPERIMENT_ID).last(),
            Some(&ExperimentState::Canceled)
        );
    }

    #[tokio::test]
    async fn test_redelivered_launch_of_launched_experiment_is_skipped() {
        let harness = TestHarness::new();
        harness.seed_experiment();
        set_experiment(&harness, ExperimentState::Launched).await;
        let service = harness.orchestrator();
        let message = MessageContext::new(
            MessageEvent::ExperimentSubmit(crate::messaging::ExperimentSubmitEvent {
                experiment_id: EXPERIMENT_ID.to_string(),
                gateway_id: GATEWAY_ID.to_string(),
            }),
            GATEWAY_ID,
        );

        service.handle_launch_message(&message, true).await.unwrap();
        service.pool().shutdown().await;

        assert!(harness
            .registry
            .get_processes_for_experiment(EXPERIMENT_ID)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_validate_experiment_and_api_version() {
        let harness = TestHarness::new();
        harness.seed_experiment();
        let service = harness.orchestrator();

        assert!(service.validate_experiment(EXPERIMENT_ID).await.unwrap());
        assert_eq!(service.get_api_version(), ORCHESTRATOR_API_VERSION);
    }

    #[test]
    fn test_build_process_orders_tasks_for_the_dag() {
        let mut experiment = ExperimentModel::new("e1", "gw", "alice");
        experiment.execution_id = Some("app".to_string());
        experiment.user_configuration.experiment_data_dir = Some("/data/e1".to_string());
        experiment.experiment_inputs = vec![
            InputDataObject::uri("structure", "/in/water.xyz"),
            InputDataObject::string("steps", "100"),
        ];
        experiment.experiment_outputs = vec![OutputDataObject::uri("log", "run.log")];

        let process = build_process(&experiment);
        let types: Vec<_> = process
            .ordered_tasks()
            .into_iter()
            .map(|task| (task.task_type, task.stage_type()))
            .collect();
        assert_eq!(
            types,
            vec![
                (TaskTypes::EnvSetup, None),
                (TaskTypes::DataStaging, Some(DataStageType::Input)),
                (TaskTypes::JobSubmission, None),
                (TaskTypes::DataStaging, Some(DataStageType::Output)),
                (TaskTypes::DataStaging, Some(DataStageType::ArchiveOutput)),
            ]
        );
        assert_eq!(process.application_interface_id.as_deref(), Some("app"));
    }
}
