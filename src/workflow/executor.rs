//! # Workflow Executor
//!
//! Runs a `WorkflowDefinition` layer by layer. Nodes of one layer run
//! concurrently, bounded by a semaphore shared across every workflow the
//! executor drives. A node starts only once all of its dependencies
//! succeeded; the first fatal failure stops the workflow and fails the
//! process.

use super::context::{TaskContext, TaskServices};
use super::definition::{WorkflowDefinition, WorkflowNode};
use super::errors::WorkflowResult;
use super::task::TaskFactory;
use super::types::{TaskOutcome, TaskResult, WorkflowOutcome};
use crate::messaging::{EventPublisher, ProcessIdentifier, TaskIdentifier};
use crate::models::{ErrorModel, ProcessModel, ProcessWorkflow, TaskStatus, WorkflowKind};
use crate::state_machine::{ProcessState, TaskState};
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

pub struct WorkflowExecutor {
    services: Arc<TaskServices>,
    factory: TaskFactory,
    task_slots: Arc<Semaphore>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for WorkflowExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowExecutor")
            .field("available_task_slots", &self.task_slots.available_permits())
            .field("running_workflows", &self.services.workflows.len())
            .finish()
    }
}

impl WorkflowExecutor {
    /// `shutdown` is the parent of every workflow token
    pub fn new(services: Arc<TaskServices>, shutdown: CancellationToken) -> Self {
        let slots = services.config.executor.max_concurrent_tasks.max(1);
        Self {
            services,
            factory: TaskFactory,
            task_slots: Arc::new(Semaphore::new(slots)),
            shutdown,
        }
    }

    pub fn services(&self) -> &Arc<TaskServices> {
        &self.services
    }

    /// Run a workflow to its end
    ///
    /// Errors are returned only when the workflow could not be started;
    /// task failures are reported through `WorkflowOutcome::Failed`.
    #[instrument(skip(self, process, definition), fields(process_id = %process.process_id, workflow_id = %definition.workflow_id()))]
    pub async fn execute(
        &self,
        process: &ProcessModel,
        definition: WorkflowDefinition,
    ) -> WorkflowResult<WorkflowOutcome> {
        let layers = definition.layers()?;
        let identity = ProcessIdentifier::new(
            &process.process_id,
            &process.experiment_id,
            &process.gateway_id,
        );

        self.services
            .registry
            .add_process_workflow(ProcessWorkflow {
                process_id: process.process_id.clone(),
                workflow_id: definition.workflow_id().to_string(),
                kind: definition.kind(),
                creation_time: Utc::now(),
            })
            .await?;
        let token = self.services.workflows.register(
            definition.workflow_id(),
            &process.process_id,
            definition.kind(),
            &self.shutdown,
        );

        info!(
            kind = ?definition.kind(),
            tasks = definition.len(),
            layers = layers.len(),
            "🔄 PROCESS: Workflow started"
        );

        let outcome = self
            .run_layers(process, &identity, definition.workflow_id(), &layers, &token)
            .await;
        self.services.workflows.finish(definition.workflow_id());

        match &outcome {
            WorkflowOutcome::Completed => {
                info!(kind = ?definition.kind(), "🔄 PROCESS: Workflow completed");
            }
            WorkflowOutcome::Cancelled => {
                info!(kind = ?definition.kind(), "🔄 PROCESS: Workflow cancelled");
            }
            WorkflowOutcome::Failed { task_id, message } => {
                error!(kind = ?definition.kind(), task_id, message, "🔄 PROCESS: Workflow failed");
                self.fail_process(&identity, definition.kind(), task_id, message)
                    .await;
            }
        }
        Ok(outcome)
    }

    async fn run_layers(
        &self,
        process: &ProcessModel,
        identity: &ProcessIdentifier,
        workflow_id: &str,
        layers: &[Vec<WorkflowNode>],
        token: &CancellationToken,
    ) -> WorkflowOutcome {
        for layer in layers {
            if token.is_cancelled() {
                return WorkflowOutcome::Cancelled;
            }
            let results = join_all(layer.iter().map(|node| {
                self.run_task(process, identity, workflow_id, node, token)
            }))
            .await;

            let mut cancelled = false;
            for (node, result) in layer.iter().zip(results) {
                match result.status {
                    TaskOutcome::Success => {}
                    TaskOutcome::Cancelled => cancelled = true,
                    TaskOutcome::Fail => {
                        return WorkflowOutcome::Failed {
                            task_id: node.task_id.clone(),
                            message: result
                                .message
                                .unwrap_or_else(|| format!("Task {} failed", node.task_type)),
                        };
                    }
                }
            }
            if cancelled {
                return WorkflowOutcome::Cancelled;
            }
        }
        WorkflowOutcome::Completed
    }

    /// Run one node with retries, recording its task status
    async fn run_task(
        &self,
        process: &ProcessModel,
        identity: &ProcessIdentifier,
        workflow_id: &str,
        node: &WorkflowNode,
        token: &CancellationToken,
    ) -> TaskResult {
        let task = self.factory.create(node.task_type);
        let max_attempts = self.services.config.executor.max_task_retries.saturating_add(1);
        let backoff = &self.services.config.executor.backoff;
        let task_identity = TaskIdentifier {
            task_id: node.task_id.clone(),
            process_id: identity.process_id.clone(),
            experiment_id: identity.experiment_id.clone(),
            gateway_id: identity.gateway_id.clone(),
        };

        self.record_task_state(&task_identity, TaskState::Executing, None)
            .await;

        let mut attempt = 1;
        let result = loop {
            if token.is_cancelled() {
                break TaskResult::cancelled();
            }
            let context = TaskContext {
                process: process.clone(),
                identity: identity.clone(),
                task_id: node.task_id.clone(),
                task_type: node.task_type,
                workflow_id: workflow_id.to_string(),
                attempt,
                cancellation: token.clone(),
                services: Arc::clone(&self.services),
            };

            let result = match self.task_slots.acquire().await {
                Ok(_permit) => task.on_run(&context).await,
                Err(_) => TaskResult::fail("Task executor is shut down", false),
            };
            if result.status == TaskOutcome::Cancelled {
                task.on_cancel(&context).await;
                break result;
            }
            if result.is_fatal() || result.is_success() || attempt >= max_attempts {
                break result;
            }

            let delay = backoff.delay_for_attempt(attempt);
            warn!(
                task_id = %node.task_id,
                task_type = %node.task_type,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                message = result.message.as_deref().unwrap_or(""),
                "⚙️ TASK: Retryable failure, retrying"
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = token.cancelled() => {}
            }
            attempt += 1;
        };

        let state = match result.status {
            TaskOutcome::Success => TaskState::Completed,
            TaskOutcome::Fail => TaskState::Failed,
            TaskOutcome::Cancelled => TaskState::Canceled,
        };
        self.record_task_state(&task_identity, state, result.message.as_deref())
            .await;
        result
    }

    /// Run a single task outside of any workflow
    ///
    /// Used when a scheduler redelivers one node; the task must converge on
    /// the same end state however often it runs.
    pub async fn run_task_once(
        &self,
        process: &ProcessModel,
        node: &WorkflowNode,
        workflow_id: &str,
    ) -> TaskResult {
        let identity = ProcessIdentifier::new(
            &process.process_id,
            &process.experiment_id,
            &process.gateway_id,
        );
        let token = self.shutdown.child_token();
        self.run_task(process, &identity, workflow_id, node, &token)
            .await
    }

    /// Best-effort task status write and publish
    async fn record_task_state(&self, identity: &TaskIdentifier, state: TaskState, reason: Option<&str>) {
        let status = match reason {
            Some(reason) => TaskStatus::with_reason(state, reason),
            None => TaskStatus::new(state),
        };
        if let Err(e) = self
            .services
            .registry
            .update_task_status(&identity.process_id, &identity.task_id, status)
            .await
        {
            warn!(task_id = %identity.task_id, error = %e, "Failed to record task status");
        }
        let message = EventPublisher::task_status_message(identity, state);
        if let Err(e) = self.services.publisher.publish(&message).await {
            warn!(task_id = %identity.task_id, error = %e, "Failed to publish task status");
        } else {
            debug!(task_id = %identity.task_id, state = %state, "⚙️ TASK: Status recorded");
        }
    }

    async fn fail_process(&self, identity: &ProcessIdentifier, kind: WorkflowKind, task_id: &str, message: &str) {
        let reason = format!("{kind:?} workflow task {task_id} failed: {message}");
        if let Err(e) = self
            .services
            .process_state
            .transition(identity, ProcessState::Failed, Some(&reason))
            .await
        {
            error!(process_id = %identity.process_id, error = %e, "Failed to mark process FAILED");
        }

        let error = ErrorModel::new(reason.clone()).with_user_message(message);
        if let Err(e) = self
            .services
            .registry
            .add_process_error(&identity.process_id, error.clone())
            .await
        {
            warn!(process_id = %identity.process_id, error = %e, "Failed to record process error");
        }
        if let Err(e) = self
            .services
            .registry
            .add_experiment_error(&identity.experiment_id, error)
            .await
        {
            warn!(experiment_id = %identity.experiment_id, error = %e, "Failed to record experiment error");
        }
    }
}
