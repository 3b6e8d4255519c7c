use super::status::TaskStatus;
use crate::state_machine::TaskState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Task kinds stored in a process task DAG
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskTypes {
    EnvSetup,
    DataStaging,
    JobSubmission,
    Monitoring,
    OutputFetching,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataStageType {
    Input,
    Output,
    ArchiveOutput,
}

/// Details of a data staging task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataStagingTaskModel {
    pub stage_type: DataStageType,
    /// Name of the process input or output being staged
    pub data_name: String,
    pub source: Option<String>,
    pub destination: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskModel {
    pub task_id: String,
    pub task_type: TaskTypes,
    pub parent_process_id: String,
    pub creation_time: DateTime<Utc>,
    pub last_update_time: DateTime<Utc>,
    pub task_statuses: Vec<TaskStatus>,
    pub task_detail: Option<String>,
    pub data_staging: Option<DataStagingTaskModel>,
}

impl TaskModel {
    pub fn new(
        task_id: impl Into<String>,
        parent_process_id: impl Into<String>,
        task_type: TaskTypes,
    ) -> Self {
        let now = Utc::now();
        Self {
            task_id: task_id.into(),
            task_type,
            parent_process_id: parent_process_id.into(),
            creation_time: now,
            last_update_time: now,
            task_statuses: vec![TaskStatus::new(TaskState::Created)],
            task_detail: None,
            data_staging: None,
        }
    }

    pub fn with_data_staging(mut self, staging: DataStagingTaskModel) -> Self {
        self.data_staging = Some(staging);
        self
    }

    pub fn current_state(&self) -> Option<TaskState> {
        self.task_statuses.last().map(|status| status.state)
    }

    pub fn stage_type(&self) -> Option<DataStageType> {
        self.data_staging.as_ref().map(|staging| staging.stage_type)
    }
}
