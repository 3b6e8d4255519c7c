use crate::constants::task_names;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Every task the executor knows how to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    EnvSetup,
    InputDataStaging,
    JobSubmission,
    JobVerification,
    OutputDataStaging,
    Archive,
    Completing,
    ParsingTriggering,
    WorkflowCancellation,
    RemoteJobCancellation,
    CancelCompleting,
}

impl TaskType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::EnvSetup => task_names::ENV_SETUP,
            Self::InputDataStaging => task_names::INPUT_DATA_STAGING,
            Self::JobSubmission => task_names::JOB_SUBMISSION,
            Self::JobVerification => task_names::JOB_VERIFICATION,
            Self::OutputDataStaging => task_names::OUTPUT_DATA_STAGING,
            Self::Archive => task_names::ARCHIVE,
            Self::Completing => task_names::COMPLETING,
            Self::ParsingTriggering => task_names::PARSING_TRIGGERING,
            Self::WorkflowCancellation => task_names::WORKFLOW_CANCELLATION,
            Self::RemoteJobCancellation => task_names::REMOTE_JOB_CANCELLATION,
            Self::CancelCompleting => task_names::CANCEL_COMPLETING,
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    Success,
    Fail,
    /// Stopped at a safe point because the workflow was cancelled
    Cancelled,
}

/// What a task reports back to the executor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub status: TaskOutcome,
    pub message: Option<String>,
    pub retryable: bool,
}

impl TaskResult {
    pub fn success() -> Self {
        Self {
            status: TaskOutcome::Success,
            message: None,
            retryable: false,
        }
    }

    pub fn success_with(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::success()
        }
    }

    pub fn fail(message: impl Into<String>, retryable: bool) -> Self {
        Self {
            status: TaskOutcome::Fail,
            message: Some(message.into()),
            retryable,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            status: TaskOutcome::Cancelled,
            message: None,
            retryable: false,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TaskOutcome::Success
    }

    /// A failure that must not be retried
    pub fn is_fatal(&self) -> bool {
        self.status == TaskOutcome::Fail && !self.retryable
    }
}

/// How a workflow run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowOutcome {
    Completed,
    Failed { task_id: String, message: String },
    Cancelled,
}
