//! Injected services and per-task execution context.

use super::errors::{WorkflowError, WorkflowResult};
use super::types::TaskType;
use crate::adaptor::{AdaptorResolver, ComputeAdaptor};
use crate::config::OrchestratorConfig;
use crate::messaging::{EventPublisher, ProcessIdentifier, TaskIdentifier};
use crate::models::{ComputeResourceDescription, ProcessModel, TaskModel, WorkflowKind};
use crate::monitor::JobTracker;
use crate::registry::{RegistryClient, StatusWrite};
use crate::state_machine::{ProcessState, ProcessStateMachine};
use dashmap::DashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Clone)]
struct RunningWorkflow {
    process_id: String,
    kind: WorkflowKind,
    token: CancellationToken,
}

/// Workflows currently executing, with their cancellation tokens
#[derive(Debug, Default)]
pub struct RunningWorkflows {
    workflows: DashMap<String, RunningWorkflow>,
}

impl RunningWorkflows {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a workflow; its token is a child of `parent`
    pub fn register(
        &self,
        workflow_id: &str,
        process_id: &str,
        kind: WorkflowKind,
        parent: &CancellationToken,
    ) -> CancellationToken {
        let token = parent.child_token();
        self.workflows.insert(
            workflow_id.to_string(),
            RunningWorkflow {
                process_id: process_id.to_string(),
                kind,
                token: token.clone(),
            },
        );
        token
    }

    pub fn finish(&self, workflow_id: &str) {
        self.workflows.remove(workflow_id);
    }

    pub fn cancel(&self, workflow_id: &str) -> bool {
        self.workflows
            .get(workflow_id)
            .map(|workflow| workflow.token.cancel())
            .is_some()
    }

    /// Cancel every workflow of a process whose kind differs from `keep`
    pub fn cancel_for_process(&self, process_id: &str, keep: WorkflowKind) -> Vec<String> {
        let mut cancelled = Vec::new();
        for entry in self.workflows.iter() {
            if entry.process_id == process_id && entry.kind != keep {
                entry.token.cancel();
                cancelled.push(entry.key().clone());
            }
        }
        cancelled
    }

    pub fn active_for_process(&self, process_id: &str) -> Vec<(String, WorkflowKind)> {
        self.workflows
            .iter()
            .filter(|entry| entry.process_id == process_id)
            .map(|entry| (entry.key().clone(), entry.kind))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}

/// Handles shared by every task, owned by the composition root
pub struct TaskServices {
    pub registry: Arc<dyn RegistryClient>,
    pub publisher: EventPublisher,
    pub process_state: ProcessStateMachine,
    pub adaptors: Arc<dyn AdaptorResolver>,
    pub job_tracker: Arc<JobTracker>,
    pub workflows: Arc<RunningWorkflows>,
    pub config: Arc<OrchestratorConfig>,
}

/// Everything a task sees while it runs
#[derive(Clone)]
pub struct TaskContext {
    pub process: ProcessModel,
    pub identity: ProcessIdentifier,
    pub task_id: String,
    pub task_type: TaskType,
    pub workflow_id: String,
    pub attempt: u32,
    pub cancellation: CancellationToken,
    pub services: Arc<TaskServices>,
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("process_id", &self.identity.process_id)
            .field("task_id", &self.task_id)
            .field("task_type", &self.task_type)
            .field("workflow_id", &self.workflow_id)
            .field("attempt", &self.attempt)
            .finish()
    }
}

impl TaskContext {
    pub fn process_id(&self) -> &str {
        &self.identity.process_id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// The registry task model behind this node, if it came from the process DAG
    pub fn task_model(&self) -> Option<&TaskModel> {
        self.process.task(&self.task_id)
    }

    pub fn task_identity(&self) -> TaskIdentifier {
        TaskIdentifier {
            task_id: self.task_id.clone(),
            process_id: self.identity.process_id.clone(),
            experiment_id: self.identity.experiment_id.clone(),
            gateway_id: self.identity.gateway_id.clone(),
        }
    }

    pub async fn transition_process(
        &self,
        next: ProcessState,
        reason: Option<&str>,
    ) -> WorkflowResult<StatusWrite> {
        let write = self
            .services
            .process_state
            .transition(&self.identity, next, reason)
            .await?;
        Ok(write)
    }

    pub fn compute_resource_id(&self) -> WorkflowResult<&str> {
        self.process
            .compute_resource_id
            .as_deref()
            .ok_or_else(|| WorkflowError::missing("compute resource id", self.process_id()))
    }

    pub async fn compute_resource(&self) -> WorkflowResult<ComputeResourceDescription> {
        let id = self.compute_resource_id()?;
        self.services
            .registry
            .get_compute_resource(id)
            .await?
            .ok_or_else(|| WorkflowError::missing("compute resource", self.process_id()))
    }

    pub async fn adaptor(&self) -> WorkflowResult<Arc<dyn ComputeAdaptor>> {
        let id = self.compute_resource_id()?;
        Ok(self.services.adaptors.resolve(id).await?)
    }

    /// Working directory on the compute resource
    pub async fn working_dir(&self) -> WorkflowResult<String> {
        if let Some(dir) = &self.process.working_dir {
            return Ok(dir.clone());
        }
        let resource = self.compute_resource().await?;
        Ok(self.process.resolved_working_dir(&resource.scratch_location))
    }

    pub fn log_step(&self, message: &str) {
        info!(
            process_id = %self.identity.process_id,
            task_id = %self.task_id,
            task_type = %self.task_type,
            attempt = self.attempt,
            "⚙️ TASK: {message}"
        );
    }
}
