use serde::{Deserialize, Serialize};
use std::fmt;

/// Experiment lifecycle states as seen by gateway users
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentState {
    /// Experiment record exists but nothing has been launched
    Created,
    /// Experiment passed launch validation
    Validated,
    /// At least one process is queued on a compute resource
    Scheduled,
    /// All processes were handed to the executor
    Launched,
    /// A process reported that remote execution started
    Executing,
    /// Termination was requested and is in flight
    Canceling,
    /// Experiment was cancelled
    Canceled,
    /// Experiment finished successfully
    Completed,
    /// Experiment failed
    Failed,
}

impl ExperimentState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Canceled | Self::Completed | Self::Failed)
    }
}

impl fmt::Display for ExperimentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Validated => write!(f, "validated"),
            Self::Scheduled => write!(f, "scheduled"),
            Self::Launched => write!(f, "launched"),
            Self::Executing => write!(f, "executing"),
            Self::Canceling => write!(f, "canceling"),
            Self::Canceled => write!(f, "canceled"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for ExperimentState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "created" => Ok(Self::Created),
            "validated" => Ok(Self::Validated),
            "scheduled" => Ok(Self::Scheduled),
            "launched" => Ok(Self::Launched),
            "executing" => Ok(Self::Executing),
            "canceling" => Ok(Self::Canceling),
            "canceled" => Ok(Self::Canceled),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid experiment state: {s}")),
        }
    }
}

/// Process lifecycle states
///
/// The declaration order below is the forward order of the happy path.
/// `Failed`, `Cancelling` and `Canceled` form the exit branches and are
/// handled separately by the transition guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    Created,
    Validated,
    Queued,
    Requeued,
    Dequeuing,
    Started,
    PreProcessing,
    ConfiguringWorkspace,
    InputDataStaging,
    Executing,
    Monitoring,
    OutputDataStaging,
    PostProcessing,
    Completed,
    Failed,
    Cancelling,
    Canceled,
}

impl ProcessState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }

    /// Check if cancellation has been requested or finished
    pub fn is_cancel_branch(&self) -> bool {
        matches!(self, Self::Cancelling | Self::Canceled)
    }

    /// Check if the process may still be launched
    pub fn is_launchable(&self) -> bool {
        matches!(self, Self::Created | Self::Validated | Self::Dequeuing)
    }

    /// Position on the forward path, `None` for the exit branches
    pub fn rank(&self) -> Option<u8> {
        let rank = match self {
            Self::Created => 0,
            Self::Validated => 1,
            Self::Queued => 2,
            Self::Requeued => 3,
            Self::Dequeuing => 4,
            Self::Started => 5,
            Self::PreProcessing => 6,
            Self::ConfiguringWorkspace => 7,
            Self::InputDataStaging => 8,
            Self::Executing => 9,
            Self::Monitoring => 10,
            Self::OutputDataStaging => 11,
            Self::PostProcessing => 12,
            Self::Completed => 13,
            Self::Failed | Self::Cancelling | Self::Canceled => return None,
        };
        Some(rank)
    }

    pub fn all() -> &'static [ProcessState] {
        &[
            Self::Created,
            Self::Validated,
            Self::Queued,
            Self::Requeued,
            Self::Dequeuing,
            Self::Started,
            Self::PreProcessing,
            Self::ConfiguringWorkspace,
            Self::InputDataStaging,
            Self::Executing,
            Self::Monitoring,
            Self::OutputDataStaging,
            Self::PostProcessing,
            Self::Completed,
            Self::Failed,
            Self::Cancelling,
            Self::Canceled,
        ]
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Validated => "validated",
            Self::Queued => "queued",
            Self::Requeued => "requeued",
            Self::Dequeuing => "dequeuing",
            Self::Started => "started",
            Self::PreProcessing => "pre_processing",
            Self::ConfiguringWorkspace => "configuring_workspace",
            Self::InputDataStaging => "input_data_staging",
            Self::Executing => "executing",
            Self::Monitoring => "monitoring",
            Self::OutputDataStaging => "output_data_staging",
            Self::PostProcessing => "post_processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelling => "cancelling",
            Self::Canceled => "canceled",
        };
        write!(f, "{name}")
    }
}

impl std::str::FromStr for ProcessState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_ascii_lowercase();
        Self::all()
            .iter()
            .copied()
            .find(|state| state.to_string() == lowered)
            .ok_or_else(|| format!("Invalid process state: {s}"))
    }
}

/// Task states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Created,
    Scheduled,
    Executing,
    Completed,
    Failed,
    Canceled,
}

impl TaskState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Scheduled => write!(f, "scheduled"),
            Self::Executing => write!(f, "executing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Canceled => write!(f, "canceled"),
        }
    }
}

impl std::str::FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "created" => Ok(Self::Created),
            "scheduled" => Ok(Self::Scheduled),
            "executing" => Ok(Self::Executing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "canceled" => Ok(Self::Canceled),
            _ => Err(format!("Invalid task state: {s}")),
        }
    }
}

/// Canonical job states reported by resource managers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Submitted,
    Queued,
    Active,
    Complete,
    Canceled,
    Failed,
    Suspended,
    Held,
    Unknown,
    NonCriticalFail,
}

impl JobState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Canceled | Self::Failed)
    }

    pub fn all() -> &'static [JobState] {
        &[
            Self::Submitted,
            Self::Queued,
            Self::Active,
            Self::Complete,
            Self::Canceled,
            Self::Failed,
            Self::Suspended,
            Self::Held,
            Self::Unknown,
            Self::NonCriticalFail,
        ]
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Submitted => "submitted",
            Self::Queued => "queued",
            Self::Active => "active",
            Self::Complete => "complete",
            Self::Canceled => "canceled",
            Self::Failed => "failed",
            Self::Suspended => "suspended",
            Self::Held => "held",
            Self::Unknown => "unknown",
            Self::NonCriticalFail => "non_critical_fail",
        };
        write!(f, "{name}")
    }
}

impl std::str::FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_ascii_lowercase();
        Self::all()
            .iter()
            .copied()
            .find(|state| state.to_string() == lowered)
            .ok_or_else(|| format!("Invalid job state: {s}"))
    }
}

/// Default state for new experiments
impl Default for ExperimentState {
    fn default() -> Self {
        Self::Created
    }
}

/// Default state for new processes
impl Default for ProcessState {
    fn default() -> Self {
        Self::Created
    }
}

/// Default state for new tasks
impl Default for TaskState {
    fn default() -> Self {
        Self::Created
    }
}
