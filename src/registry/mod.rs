//! # Registry Collaborator
//!
//! The registry is the external system of record for experiments,
//! processes, tasks and jobs. This module defines the interface the
//! orchestration core consumes and an in-memory implementation.
//!
//! Status writes pass through the monotonic transition guards inside the
//! registry boundary, so concurrent writers (pull and push monitors, the
//! workflow executor) can never regress a process.

pub mod errors;
pub mod in_memory;

use crate::models::{
    ApplicationDeployment, ComputeResourceDescription, ErrorModel, ExperimentModel,
    ExperimentStatus, GroupResourceProfile, JobModel, JobStatus, ProcessModel, ProcessStatus,
    ProcessWorkflow, TaskStatus,
};
use crate::state_machine::TransitionDecision;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use errors::{RegistryError, RegistryResult};
pub use in_memory::InMemoryRegistry;

/// Job attributes usable as `get_jobs` filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobField {
    JobId,
    JobName,
    ProcessId,
    TaskId,
}

impl fmt::Display for JobField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::JobId => write!(f, "jobId"),
            Self::JobName => write!(f, "jobName"),
            Self::ProcessId => write!(f, "processId"),
            Self::TaskId => write!(f, "taskId"),
        }
    }
}

/// Result of a guarded status write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusWrite {
    /// The new status was stored
    Applied,
    /// The entity already had this status; nothing changed
    Duplicate,
    /// The write would regress the entity; nothing changed
    Rejected { reason: String },
}

impl StatusWrite {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

impl From<TransitionDecision> for StatusWrite {
    fn from(decision: TransitionDecision) -> Self {
        match decision {
            TransitionDecision::Apply => Self::Applied,
            TransitionDecision::Duplicate => Self::Duplicate,
            TransitionDecision::Rejected { reason } => Self::Rejected { reason },
        }
    }
}

/// Registry operations consumed by the orchestration core
#[async_trait]
pub trait RegistryClient: Send + Sync + 'static {
    async fn get_experiment(&self, experiment_id: &str) -> RegistryResult<Option<ExperimentModel>>;

    async fn get_experiment_status(
        &self,
        experiment_id: &str,
    ) -> RegistryResult<Option<ExperimentStatus>>;

    async fn update_experiment_status(
        &self,
        experiment_id: &str,
        status: ExperimentStatus,
    ) -> RegistryResult<StatusWrite>;

    async fn add_experiment_error(&self, experiment_id: &str, error: ErrorModel) -> RegistryResult<()>;

    /// Store a new process and link it to its experiment
    async fn add_process(&self, process: ProcessModel) -> RegistryResult<String>;

    async fn get_process(&self, process_id: &str) -> RegistryResult<Option<ProcessModel>>;

    async fn get_processes_for_experiment(&self, experiment_id: &str) -> RegistryResult<Vec<ProcessModel>>;

    /// Replace the stored process; status history is kept from the stored copy
    async fn update_process(&self, process: ProcessModel) -> RegistryResult<()>;

    async fn get_process_status(&self, process_id: &str) -> RegistryResult<Option<ProcessStatus>>;

    async fn add_process_status(
        &self,
        process_id: &str,
        status: ProcessStatus,
    ) -> RegistryResult<StatusWrite>;

    /// Same guarded write as `add_process_status`
    async fn update_process_status(
        &self,
        process_id: &str,
        status: ProcessStatus,
    ) -> RegistryResult<StatusWrite> {
        self.add_process_status(process_id, status).await
    }

    async fn add_process_error(&self, process_id: &str, error: ErrorModel) -> RegistryResult<()>;

    async fn get_jobs(&self, field: JobField, value: &str) -> RegistryResult<Vec<JobModel>>;

    /// Insert a job, or update the stored one with the same job and task id
    async fn add_job(&self, job: JobModel) -> RegistryResult<()>;

    /// Append to a job's status history if the job state validator allows it
    async fn add_job_status(
        &self,
        job_id: &str,
        task_id: &str,
        status: JobStatus,
    ) -> RegistryResult<StatusWrite>;

    async fn update_task_status(
        &self,
        process_id: &str,
        task_id: &str,
        status: TaskStatus,
    ) -> RegistryResult<()>;

    async fn add_process_workflow(&self, workflow: ProcessWorkflow) -> RegistryResult<()>;

    async fn get_process_workflows(&self, process_id: &str) -> RegistryResult<Vec<ProcessWorkflow>>;

    async fn get_group_resource_profile(
        &self,
        group_resource_profile_id: &str,
    ) -> RegistryResult<Option<GroupResourceProfile>>;

    async fn get_compute_resource(
        &self,
        compute_resource_id: &str,
    ) -> RegistryResult<Option<ComputeResourceDescription>>;

    async fn get_application_deployment(
        &self,
        app_deployment_id: &str,
    ) -> RegistryResult<Option<ApplicationDeployment>>;

    /// Deployment of an application module on one compute resource
    async fn find_application_deployment(
        &self,
        app_module_id: &str,
        compute_resource_id: &str,
    ) -> RegistryResult<Option<ApplicationDeployment>>;
}
