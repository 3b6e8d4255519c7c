use super::errors::MonitorResult;
use super::result::JobStatusResult;
use crate::models::{JobModel, ProcessModel};
use crate::registry::{JobField, RegistryClient};
use crate::state_machine::JobState;
use std::sync::Arc;
use tracing::{error, warn};

/// A status report tied to exactly one registry job and its owners
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedJobStatus {
    pub job: JobModel,
    pub process: ProcessModel,
    pub experiment_id: String,
    pub gateway_id: String,
    pub state: JobState,
    pub reason: Option<String>,
}

/// Cross-checks monitor reports against the registry before anything is written
#[derive(Clone)]
pub struct JobStatusValidator {
    registry: Arc<dyn RegistryClient>,
}

impl JobStatusValidator {
    pub fn new(registry: Arc<dyn RegistryClient>) -> Self {
        Self { registry }
    }

    /// `Ok(None)` means the report must be dropped; registry failures are errors
    pub async fn validate(&self, result: &JobStatusResult) -> MonitorResult<Option<ValidatedJobStatus>> {
        let jobs = self.registry.get_jobs(JobField::JobId, &result.job_id).await?;
        let matching: Vec<JobModel> = jobs
            .into_iter()
            .filter(|job| job.job_name == result.job_name)
            .collect();

        if matching.len() != 1 {
            error!(
                job_id = %result.job_id,
                job_name = %result.job_name,
                matches = matching.len(),
                "Job status update does not match exactly one registry job"
            );
            return Ok(None);
        }
        let Some(job) = matching.into_iter().next() else {
            return Ok(None);
        };

        if job.process_id.is_empty() {
            warn!(job_id = %job.job_id, "Registry job has no owning process");
            return Ok(None);
        }
        let Some(process) = self.registry.get_process(&job.process_id).await? else {
            warn!(job_id = %job.job_id, process_id = %job.process_id, "Owning process not found");
            return Ok(None);
        };
        if process.experiment_id.is_empty() {
            warn!(job_id = %job.job_id, process_id = %process.process_id, "Process has no experiment");
            return Ok(None);
        }
        let Some(experiment) = self.registry.get_experiment(&process.experiment_id).await? else {
            warn!(
                job_id = %job.job_id,
                process_id = %process.process_id,
                experiment_id = %process.experiment_id,
                "Owning experiment not found"
            );
            return Ok(None);
        };

        Ok(Some(ValidatedJobStatus {
            experiment_id: experiment.experiment_id,
            gateway_id: experiment.gateway_id,
            state: result.state,
            reason: result.reason.clone(),
            job,
            process,
        }))
    }

    /// True iff the report resolves to exactly one job with a matching name and known owners
    pub async fn validate_job_status(&self, result: &JobStatusResult) -> bool {
        match self.validate(result).await {
            Ok(validated) => validated.is_some(),
            Err(e) => {
                error!(job_id = %result.job_id, error = %e, "Job status validation failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExperimentModel;
    use crate::registry::InMemoryRegistry;

    fn registry() -> Arc<InMemoryRegistry> {
        let registry = Arc::new(InMemoryRegistry::new());
        registry.insert_experiment(ExperimentModel::new("e1", "gw", "alice"));
        registry.insert_process(ProcessModel::new("e1", "gw").with_id("p1"));
        registry.insert_job(JobModel::new("100", "A100", "p1", "t1"));
        registry
    }

    #[tokio::test]
    async fn test_single_matching_job_validates() {
        let validator = JobStatusValidator::new(registry());
        let validated = validator
            .validate(&JobStatusResult::new("100", "A100", JobState::Active))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(validated.experiment_id, "e1");
        assert_eq!(validated.gateway_id, "gw");
        assert_eq!(validated.process.process_id, "p1");
    }

    #[tokio::test]
    async fn test_name_mismatch_and_missing_job_are_dropped() {
        let validator = JobStatusValidator::new(registry());
        assert!(!validator
            .validate_job_status(&JobStatusResult::new("100", "other", JobState::Active))
            .await);
        assert!(!validator
            .validate_job_status(&JobStatusResult::new("999", "A999", JobState::Active))
            .await);
    }

    #[tokio::test]
    async fn test_duplicate_jobs_are_dropped() {
        let registry = registry();
        registry.insert_job(JobModel::new("100", "A100", "p1", "t2"));
        let validator = JobStatusValidator::new(registry);
        assert!(!validator
            .validate_job_status(&JobStatusResult::new("100", "A100", JobState::Active))
            .await);
    }

    #[tokio::test]
    async fn test_orphan_job_is_dropped() {
        let registry = registry();
        registry.insert_job(JobModel::new("200", "A200", "missing", "t1"));
        let validator = JobStatusValidator::new(registry);
        assert!(!validator
            .validate_job_status(&JobStatusResult::new("200", "A200", JobState::Active))
            .await);
    }

    #[tokio::test]
    async fn test_missing_experiment_is_dropped() {
        let registry = registry();
        registry.insert_process(ProcessModel::new("gone", "gw").with_id("p2"));
        registry.insert_job(JobModel::new("300", "A300", "p2", "t1"));
        let validator = JobStatusValidator::new(registry);
        assert!(validator
            .validate(&JobStatusResult::new("300", "A300", JobState::Active))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_gateway_comes_from_the_experiment() {
        let registry = registry();
        registry.insert_experiment(ExperimentModel::new("e2", "gw-real", "bob"));
        registry.insert_process(ProcessModel::new("e2", "").with_id("p3"));
        registry.insert_job(JobModel::new("400", "A400", "p3", "t1"));
        let validator = JobStatusValidator::new(registry);
        let validated = validator
            .validate(&JobStatusResult::new("400", "A400", JobState::Queued))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(validated.gateway_id, "gw-real");
    }
}
