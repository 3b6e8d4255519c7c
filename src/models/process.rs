use super::data::{InputDataObject, OutputDataObject};
use super::status::{ErrorModel, ProcessStatus};
use super::task::TaskModel;
use crate::state_machine::ProcessState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Resources requested from the batch system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ComputationalResourceScheduling {
    pub resource_host_id: Option<String>,
    pub queue_name: Option<String>,
    pub node_count: u32,
    pub total_cpu_count: u32,
    /// Minutes
    pub wall_time_limit: u32,
}

/// Scheduled execution attempt of an experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessModel {
    pub process_id: String,
    pub experiment_id: String,
    pub gateway_id: String,
    pub user_name: String,
    pub creation_time: DateTime<Utc>,
    pub last_update_time: DateTime<Utc>,
    pub process_statuses: Vec<ProcessStatus>,
    pub process_detail: Option<String>,
    pub application_interface_id: Option<String>,
    pub application_deployment_id: Option<String>,
    pub compute_resource_id: Option<String>,
    pub group_resource_profile_id: Option<String>,
    /// Comma separated task ids in execution order
    pub task_dag: Option<String>,
    pub tasks: Vec<TaskModel>,
    pub process_inputs: Vec<InputDataObject>,
    pub process_outputs: Vec<OutputDataObject>,
    pub resource_schedule: ComputationalResourceScheduling,
    pub working_dir: Option<String>,
    pub experiment_data_dir: Option<String>,
    pub process_errors: Vec<ErrorModel>,
}

impl ProcessModel {
    pub fn new(experiment_id: impl Into<String>, gateway_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            process_id: format!("PROCESS_{}", Uuid::new_v4()),
            experiment_id: experiment_id.into(),
            gateway_id: gateway_id.into(),
            user_name: String::new(),
            creation_time: now,
            last_update_time: now,
            process_statuses: vec![ProcessStatus::new(ProcessState::Created)],
            process_detail: None,
            application_interface_id: None,
            application_deployment_id: None,
            compute_resource_id: None,
            group_resource_profile_id: None,
            task_dag: None,
            tasks: Vec::new(),
            process_inputs: Vec::new(),
            process_outputs: Vec::new(),
            resource_schedule: ComputationalResourceScheduling::default(),
            working_dir: None,
            experiment_data_dir: None,
            process_errors: Vec::new(),
        }
    }

    pub fn with_id(mut self, process_id: impl Into<String>) -> Self {
        self.process_id = process_id.into();
        self
    }

    pub fn latest_status(&self) -> Option<&ProcessStatus> {
        self.process_statuses.last()
    }

    pub fn current_state(&self) -> Option<ProcessState> {
        self.latest_status().map(|status| status.state)
    }

    /// Task ids listed in the DAG string, in order
    pub fn task_dag_ids(&self) -> Vec<&str> {
        self.task_dag
            .as_deref()
            .map(|dag| {
                dag.split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn task(&self, task_id: &str) -> Option<&TaskModel> {
        self.tasks.iter().find(|task| task.task_id == task_id)
    }

    /// Tasks in DAG order, falling back to declaration order when no DAG is set
    pub fn ordered_tasks(&self) -> Vec<&TaskModel> {
        let ids = self.task_dag_ids();
        if ids.is_empty() {
            return self.tasks.iter().collect();
        }
        ids.into_iter().filter_map(|id| self.task(id)).collect()
    }

    /// Working directory, defaulting to one named after the process
    pub fn resolved_working_dir(&self, scratch_location: &str) -> String {
        self.working_dir.clone().unwrap_or_else(|| {
            format!("{}/{}", scratch_location.trim_end_matches('/'), self.process_id)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    Pre,
    Post,
    Cancel,
}

/// A workflow started on behalf of a process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessWorkflow {
    pub process_id: String,
    pub workflow_id: String,
    pub kind: WorkflowKind,
    pub creation_time: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::task::{TaskModel, TaskTypes};

    #[test]
    fn test_ordered_tasks_follow_dag() {
        let mut process = ProcessModel::new("exp-1", "gw").with_id("proc-1");
        process.tasks = vec![
            TaskModel::new("t-submit", "proc-1", TaskTypes::JobSubmission),
            TaskModel::new("t-env", "proc-1", TaskTypes::EnvSetup),
        ];
        process.task_dag = Some("t-env, t-submit".to_string());

        let ids: Vec<&str> = process.ordered_tasks().iter().map(|t| t.task_id.as_str()).collect();
        assert_eq!(ids, vec!["t-env", "t-submit"]);
    }

    #[test]
    fn test_working_dir_default() {
        let process = ProcessModel::new("exp-1", "gw").with_id("proc-1");
        assert_eq!(process.resolved_working_dir("/scratch/"), "/scratch/proc-1");
    }
}
