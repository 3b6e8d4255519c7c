use crate::state_machine::{ExperimentState, JobState, ProcessState, TaskState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One timestamped entry of a status history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEntry<S> {
    pub state: S,
    pub time_of_state_change: DateTime<Utc>,
    pub reason: Option<String>,
}

impl<S> StatusEntry<S> {
    pub fn new(state: S) -> Self {
        Self {
            state,
            time_of_state_change: Utc::now(),
            reason: None,
        }
    }

    pub fn with_reason(state: S, reason: impl Into<String>) -> Self {
        Self {
            state,
            time_of_state_change: Utc::now(),
            reason: Some(reason.into()),
        }
    }
}

pub type ExperimentStatus = StatusEntry<ExperimentState>;
pub type ProcessStatus = StatusEntry<ProcessState>;
pub type TaskStatus = StatusEntry<TaskState>;
pub type JobStatus = StatusEntry<JobState>;

/// Error recorded against an experiment or process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorModel {
    pub error_id: String,
    pub creation_time: DateTime<Utc>,
    pub actual_error_message: String,
    pub user_friendly_message: Option<String>,
    /// True when retrying the failed operation may succeed
    pub transient: bool,
}

impl ErrorModel {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error_id: Uuid::new_v4().to_string(),
            creation_time: Utc::now(),
            actual_error_message: message.into(),
            user_friendly_message: None,
            transient: false,
        }
    }

    pub fn with_user_message(mut self, message: impl Into<String>) -> Self {
        self.user_friendly_message = Some(message.into());
        self
    }

    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }
}
