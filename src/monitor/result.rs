use crate::state_machine::JobState;
use serde::{Deserialize, Serialize};

/// Parsed job status report, not yet checked against the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusResult {
    pub job_id: String,
    pub job_name: String,
    pub state: JobState,
    #[serde(default)]
    pub reason: Option<String>,
    /// Which monitor or parser produced the report
    #[serde(default)]
    pub publisher_name: String,
}

impl JobStatusResult {
    pub fn new(job_id: impl Into<String>, job_name: impl Into<String>, state: JobState) -> Self {
        Self {
            job_id: job_id.into(),
            job_name: job_name.into(),
            state,
            reason: None,
            publisher_name: String::new(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn published_by(mut self, publisher: impl Into<String>) -> Self {
        self.publisher_name = publisher.into();
        self
    }
}
