//! In-memory registry used by tests and standalone deployments.

use super::{JobField, RegistryClient, RegistryError, RegistryResult, StatusWrite};
use crate::models::{
    ApplicationDeployment, ComputeResourceDescription, ErrorModel, ExperimentModel,
    ExperimentStatus, GroupResourceProfile, JobModel, JobStatus, ProcessModel, ProcessStatus,
    ProcessWorkflow, TaskStatus,
};
use crate::state_machine::{
    ExperimentState, ExperimentTransitionGuard, JobStateValidator, ProcessState, ProcessTransitionGuard,
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, warn};

#[derive(Default)]
struct RegistryState {
    experiments: HashMap<String, ExperimentModel>,
    processes: HashMap<String, ProcessModel>,
    jobs: Vec<JobModel>,
    workflows: HashMap<String, Vec<ProcessWorkflow>>,
    group_profiles: HashMap<String, GroupResourceProfile>,
    compute_resources: HashMap<String, ComputeResourceDescription>,
    deployments: HashMap<String, ApplicationDeployment>,
}

/// Registry backed by process memory
///
/// Guards are evaluated while the write lock is held, which makes each
/// status write atomic with respect to every other writer.
///
/// ```rust
/// use airavata_core::models::ExperimentModel;
/// use airavata_core::registry::{InMemoryRegistry, RegistryClient};
///
/// # tokio_test::block_on(async {
/// let registry = InMemoryRegistry::new();
/// registry.insert_experiment(ExperimentModel::new("EXP_1", "default", "alice"));
/// let experiment = registry.get_experiment("EXP_1").await.unwrap();
/// assert!(experiment.is_some());
/// # });
/// ```
#[derive(Default)]
pub struct InMemoryRegistry {
    state: RwLock<RegistryState>,
    unavailable_calls: AtomicU32,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_experiment(&self, experiment: ExperimentModel) {
        self.state
            .write()
            .experiments
            .insert(experiment.experiment_id.clone(), experiment);
    }

    pub fn insert_process(&self, process: ProcessModel) {
        let mut state = self.state.write();
        if let Some(experiment) = state.experiments.get_mut(&process.experiment_id) {
            if !experiment.process_ids.contains(&process.process_id) {
                experiment.process_ids.push(process.process_id.clone());
            }
        }
        state.processes.insert(process.process_id.clone(), process);
    }

    pub fn insert_job(&self, job: JobModel) {
        self.state.write().jobs.push(job);
    }

    pub fn insert_group_resource_profile(&self, profile: GroupResourceProfile) {
        self.state
            .write()
            .group_profiles
            .insert(profile.group_resource_profile_id.clone(), profile);
    }

    pub fn insert_compute_resource(&self, resource: ComputeResourceDescription) {
        self.state
            .write()
            .compute_resources
            .insert(resource.compute_resource_id.clone(), resource);
    }

    pub fn insert_application_deployment(&self, deployment: ApplicationDeployment) {
        self.state
            .write()
            .deployments
            .insert(deployment.app_deployment_id.clone(), deployment);
    }

    /// Make the next `calls` registry operations fail as unavailable
    pub fn fail_next_calls(&self, calls: u32) {
        self.unavailable_calls.store(calls, Ordering::SeqCst);
    }

    /// Snapshot of a process status history
    pub fn process_history(&self, process_id: &str) -> Vec<ProcessStatus> {
        self.state
            .read()
            .processes
            .get(process_id)
            .map(|process| process.process_statuses.clone())
            .unwrap_or_default()
    }

    /// Snapshot of an experiment status history
    pub fn process_states(&self, process_id: &str) -> Vec<ProcessState> {
        self.process_history(process_id)
            .into_iter()
            .map(|status| status.state)
            .collect()
    }

    pub fn experiment_states(&self, experiment_id: &str) -> Vec<ExperimentState> {
        self.experiment_history(experiment_id)
            .into_iter()
            .map(|status| status.state)
            .collect()
    }

    pub fn experiment_history(&self, experiment_id: &str) -> Vec<ExperimentStatus> {
        self.state
            .read()
            .experiments
            .get(experiment_id)
            .map(|experiment| experiment.experiment_status.clone())
            .unwrap_or_default()
    }

    pub fn job_count(&self) -> usize {
        self.state.read().jobs.len()
    }

    fn check_available(&self) -> RegistryResult<()> {
        let remaining = self.unavailable_calls.load(Ordering::SeqCst);
        if remaining > 0
            && self
                .unavailable_calls
                .compare_exchange(remaining, remaining - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            return Err(RegistryError::Unavailable(
                "in-memory registry configured to fail".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl RegistryClient for InMemoryRegistry {
    async fn get_experiment(&self, experiment_id: &str) -> RegistryResult<Option<ExperimentModel>> {
        self.check_available()?;
        Ok(self.state.read().experiments.get(experiment_id).cloned())
    }

    async fn get_experiment_status(
        &self,
        experiment_id: &str,
    ) -> RegistryResult<Option<ExperimentStatus>> {
        self.check_available()?;
        Ok(self
            .state
            .read()
            .experiments
            .get(experiment_id)
            .and_then(|experiment| experiment.latest_status().cloned()))
    }

    async fn update_experiment_status(
        &self,
        experiment_id: &str,
        status: ExperimentStatus,
    ) -> RegistryResult<StatusWrite> {
        self.check_available()?;
        let mut state = self.state.write();
        let experiment = state
            .experiments
            .get_mut(experiment_id)
            .ok_or_else(|| RegistryError::not_found("Experiment", experiment_id))?;

        let decision = ExperimentTransitionGuard::evaluate(experiment.current_state(), status.state);
        if decision.is_apply() {
            experiment.experiment_status.push(status);
        } else {
            debug!(experiment_id, state = %status.state, ?decision, "Experiment status write not applied");
        }
        Ok(decision.into())
    }

    async fn add_experiment_error(&self, experiment_id: &str, error: ErrorModel) -> RegistryResult<()> {
        self.check_available()?;
        let mut state = self.state.write();
        let experiment = state
            .experiments
            .get_mut(experiment_id)
            .ok_or_else(|| RegistryError::not_found("Experiment", experiment_id))?;
        experiment.errors.push(error);
        Ok(())
    }

    async fn add_process(&self, process: ProcessModel) -> RegistryResult<String> {
        self.check_available()?;
        let mut state = self.state.write();
        if state.processes.contains_key(&process.process_id) {
            return Err(RegistryError::Conflict(format!(
                "process {} already exists",
                process.process_id
            )));
        }
        let experiment = state
            .experiments
            .get_mut(&process.experiment_id)
            .ok_or_else(|| RegistryError::not_found("Experiment", process.experiment_id.clone()))?;
        experiment.process_ids.push(process.process_id.clone());
        let process_id = process.process_id.clone();
        state.processes.insert(process_id.clone(), process);
        Ok(process_id)
    }

    async fn get_process(&self, process_id: &str) -> RegistryResult<Option<ProcessModel>> {
        self.check_available()?;
        Ok(self.state.read().processes.get(process_id).cloned())
    }

    async fn get_processes_for_experiment(&self, experiment_id: &str) -> RegistryResult<Vec<ProcessModel>> {
        self.check_available()?;
        let state = self.state.read();
        let Some(experiment) = state.experiments.get(experiment_id) else {
            return Ok(Vec::new());
        };
        Ok(experiment
            .process_ids
            .iter()
            .filter_map(|id| state.processes.get(id).cloned())
            .collect())
    }

    async fn update_process(&self, mut process: ProcessModel) -> RegistryResult<()> {
        self.check_available()?;
        let mut state = self.state.write();
        let stored = state
            .processes
            .get_mut(&process.process_id)
            .ok_or_else(|| RegistryError::not_found("Process", process.process_id.clone()))?;

        process.process_statuses = std::mem::take(&mut stored.process_statuses);
        for task in &mut process.tasks {
            if let Some(existing) = stored.tasks.iter_mut().find(|t| t.task_id == task.task_id) {
                task.task_statuses = std::mem::take(&mut existing.task_statuses);
            }
        }
        process.last_update_time = Utc::now();
        *stored = process;
        Ok(())
    }

    async fn get_process_status(&self, process_id: &str) -> RegistryResult<Option<ProcessStatus>> {
        self.check_available()?;
        Ok(self
            .state
            .read()
            .processes
            .get(process_id)
            .and_then(|process| process.latest_status().cloned()))
    }

    async fn add_process_status(
        &self,
        process_id: &str,
        status: ProcessStatus,
    ) -> RegistryResult<StatusWrite> {
        self.check_available()?;
        let mut state = self.state.write();
        let process = state
            .processes
            .get_mut(process_id)
            .ok_or_else(|| RegistryError::not_found("Process", process_id))?;

        let decision = ProcessTransitionGuard::evaluate(process.current_state(), status.state);
        if decision.is_apply() {
            process.process_statuses.push(status);
            process.last_update_time = Utc::now();
        } else {
            debug!(process_id, state = %status.state, ?decision, "Process status write not applied");
        }
        Ok(decision.into())
    }

    async fn add_process_error(&self, process_id: &str, error: ErrorModel) -> RegistryResult<()> {
        self.check_available()?;
        let mut state = self.state.write();
        let process = state
            .processes
            .get_mut(process_id)
            .ok_or_else(|| RegistryError::not_found("Process", process_id))?;
        process.process_errors.push(error);
        Ok(())
    }

    async fn get_jobs(&self, field: JobField, value: &str) -> RegistryResult<Vec<JobModel>> {
        self.check_available()?;
        let state = self.state.read();
        Ok(state
            .jobs
            .iter()
            .filter(|job| match field {
                JobField::JobId => job.job_id == value,
                JobField::JobName => job.job_name == value,
                JobField::ProcessId => job.process_id == value,
                JobField::TaskId => job.task_id == value,
            })
            .cloned()
            .collect())
    }

    async fn add_job(&self, mut job: JobModel) -> RegistryResult<()> {
        self.check_available()?;
        let mut state = self.state.write();
        match state
            .jobs
            .iter_mut()
            .find(|stored| stored.job_id == job.job_id && stored.task_id == job.task_id)
        {
            Some(stored) => {
                job.job_statuses = std::mem::take(&mut stored.job_statuses);
                *stored = job;
            }
            None => state.jobs.push(job),
        }
        Ok(())
    }

    async fn add_job_status(
        &self,
        job_id: &str,
        task_id: &str,
        status: JobStatus,
    ) -> RegistryResult<StatusWrite> {
        self.check_available()?;
        let mut state = self.state.write();
        let job = state
            .jobs
            .iter_mut()
            .find(|job| job.job_id == job_id && job.task_id == task_id)
            .ok_or_else(|| RegistryError::not_found("Job", job_id))?;

        let decision = JobStateValidator::evaluate(job.current_state(), status.state);
        if decision.is_apply() {
            job.job_statuses.push(status);
        } else {
            warn!(job_id, state = %status.state, ?decision, "Job status write not applied");
        }
        Ok(decision.into())
    }

    async fn update_task_status(
        &self,
        process_id: &str,
        task_id: &str,
        status: TaskStatus,
    ) -> RegistryResult<()> {
        self.check_available()?;
        let mut state = self.state.write();
        let process = state
            .processes
            .get_mut(process_id)
            .ok_or_else(|| RegistryError::not_found("Process", process_id))?;
        if let Some(task) = process.tasks.iter_mut().find(|task| task.task_id == task_id) {
            if task.current_state() != Some(status.state) {
                task.last_update_time = Utc::now();
                task.task_statuses.push(status);
            }
        }
        Ok(())
    }

    async fn add_process_workflow(&self, workflow: ProcessWorkflow) -> RegistryResult<()> {
        self.check_available()?;
        self.state
            .write()
            .workflows
            .entry(workflow.process_id.clone())
            .or_default()
            .push(workflow);
        Ok(())
    }

    async fn get_process_workflows(&self, process_id: &str) -> RegistryResult<Vec<ProcessWorkflow>> {
        self.check_available()?;
        Ok(self
            .state
            .read()
            .workflows
            .get(process_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_group_resource_profile(
        &self,
        group_resource_profile_id: &str,
    ) -> RegistryResult<Option<GroupResourceProfile>> {
        self.check_available()?;
        Ok(self
            .state
            .read()
            .group_profiles
            .get(group_resource_profile_id)
            .cloned())
    }

    async fn get_compute_resource(
        &self,
        compute_resource_id: &str,
    ) -> RegistryResult<Option<ComputeResourceDescription>> {
        self.check_available()?;
        Ok(self
            .state
            .read()
            .compute_resources
            .get(compute_resource_id)
            .cloned())
    }

    async fn get_application_deployment(
        &self,
        app_deployment_id: &str,
    ) -> RegistryResult<Option<ApplicationDeployment>> {
        self.check_available()?;
        Ok(self.state.read().deployments.get(app_deployment_id).cloned())
    }

    async fn find_application_deployment(
        &self,
        app_module_id: &str,
        compute_resource_id: &str,
    ) -> RegistryResult<Option<ApplicationDeployment>> {
        self.check_available()?;
        Ok(self
            .state
            .read()
            .deployments
            .values()
            .find(|deployment| {
                deployment.app_module_id == app_module_id && deployment.compute_host_id == compute_resource_id
            })
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::{JobState, ProcessState};

    fn seeded() -> InMemoryRegistry {
        let registry = InMemoryRegistry::new();
        registry.insert_experiment(ExperimentModel::new("exp-1", "gw", "alice"));
        registry.insert_process(ProcessModel::new("exp-1", "gw").with_id("proc-1"));
        registry
    }

    #[tokio::test]
    async fn test_process_status_is_monotonic() {
        let registry = seeded();
        let write = registry
            .add_process_status("proc-1", ProcessStatus::new(ProcessState::Executing))
            .await
            .unwrap();
        assert_eq!(write, StatusWrite::Applied);

        let write = registry
            .add_process_status("proc-1", ProcessStatus::new(ProcessState::Started))
            .await
            .unwrap();
        assert!(matches!(write, StatusWrite::Rejected { .. }));

        let write = registry
            .add_process_status("proc-1", ProcessStatus::new(ProcessState::Executing))
            .await
            .unwrap();
        assert_eq!(write, StatusWrite::Duplicate);

        let states: Vec<ProcessState> = registry
            .process_history("proc-1")
            .into_iter()
            .map(|s| s.state)
            .collect();
        assert_eq!(states, vec![ProcessState::Created, ProcessState::Executing]);
    }

    #[tokio::test]
    async fn test_add_process_links_experiment() {
        let registry = seeded();
        registry
            .add_process(ProcessModel::new("exp-1", "gw").with_id("proc-2"))
            .await
            .unwrap();
        let processes = registry.get_processes_for_experiment("exp-1").await.unwrap();
        assert_eq!(processes.len(), 2);
    }

    #[tokio::test]
    async fn test_job_history_is_append_only() {
        let registry = seeded();
        registry
            .add_job(JobModel::new("42", "A42", "proc-1", "task-1"))
            .await
            .unwrap();
        registry
            .add_job_status("42", "task-1", JobStatus::new(JobState::Active))
            .await
            .unwrap();
        registry
            .add_job_status("42", "task-1", JobStatus::new(JobState::Complete))
            .await
            .unwrap();
        let late = registry
            .add_job_status("42", "task-1", JobStatus::new(JobState::Active))
            .await
            .unwrap();
        assert!(matches!(late, StatusWrite::Rejected { .. }));

        // re-adding the job keeps the stored history
        registry
            .add_job(JobModel::new("42", "A42", "proc-1", "task-1"))
            .await
            .unwrap();
        let jobs = registry.get_jobs(JobField::JobId, "42").await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job_statuses.len(), 2);
        assert_eq!(jobs[0].current_state(), Some(JobState::Complete));
    }

    #[tokio::test]
    async fn test_update_process_keeps_status_history() {
        let registry = seeded();
        registry
            .add_process_status("proc-1", ProcessStatus::new(ProcessState::Started))
            .await
            .unwrap();
        let mut stale = ProcessModel::new("exp-1", "gw").with_id("proc-1");
        stale.working_dir = Some("/scratch/proc-1".to_string());
        registry.update_process(stale).await.unwrap();

        let process = registry.get_process("proc-1").await.unwrap().unwrap();
        assert_eq!(process.current_state(), Some(ProcessState::Started));
        assert_eq!(process.working_dir.as_deref(), Some("/scratch/proc-1"));
    }

    #[tokio::test]
    async fn test_injected_unavailability() {
        let registry = seeded();
        registry.fail_next_calls(1);
        let err = registry.get_process("proc-1").await.unwrap_err();
        assert!(err.is_transient());
        assert!(registry.get_process("proc-1").await.unwrap().is_some());
    }
}
