use super::status::JobStatus;
use crate::state_machine::JobState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unit of work visible to the remote resource manager
///
/// A job belongs to exactly one process through exactly one task. Its
/// status history only grows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobModel {
    pub job_id: String,
    pub task_id: String,
    pub process_id: String,
    pub job_name: String,
    pub job_description: String,
    pub compute_resource_id: Option<String>,
    pub working_dir: Option<String>,
    pub std_out: Option<String>,
    pub std_err: Option<String>,
    pub exit_code: Option<i32>,
    pub creation_time: DateTime<Utc>,
    pub job_statuses: Vec<JobStatus>,
}

impl JobModel {
    pub fn new(
        job_id: impl Into<String>,
        job_name: impl Into<String>,
        process_id: impl Into<String>,
        task_id: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            task_id: task_id.into(),
            process_id: process_id.into(),
            job_name: job_name.into(),
            job_description: String::new(),
            compute_resource_id: None,
            working_dir: None,
            std_out: None,
            std_err: None,
            exit_code: None,
            creation_time: Utc::now(),
            job_statuses: Vec::new(),
        }
    }

    pub fn latest_status(&self) -> Option<&JobStatus> {
        self.job_statuses.last()
    }

    pub fn current_state(&self) -> Option<JobState> {
        self.latest_status().map(|status| status.state)
    }

    /// True until the job reaches COMPLETE, CANCELED or FAILED
    pub fn is_live(&self) -> bool {
        self.current_state().map_or(true, |state| !state.is_terminal())
    }
}
