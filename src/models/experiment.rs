use super::data::{InputDataObject, OutputDataObject};
use super::status::{ErrorModel, ExperimentStatus};
use crate::state_machine::ExperimentState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentType {
    #[default]
    SingleApplication,
    Workflow,
}

/// Where and how the user asked the experiment to run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct UserConfigurationData {
    pub airavata_auto_schedule: bool,
    pub group_resource_profile_id: Option<String>,
    pub resource_host_id: Option<String>,
    pub queue_name: Option<String>,
    pub node_count: u32,
    pub total_cpu_count: u32,
    /// Minutes
    pub wall_time_limit: u32,
    pub experiment_data_dir: Option<String>,
}

/// User-submitted unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentModel {
    pub experiment_id: String,
    pub project_id: String,
    pub gateway_id: String,
    pub experiment_type: ExperimentType,
    pub user_name: String,
    pub experiment_name: String,
    pub creation_time: DateTime<Utc>,
    pub description: Option<String>,
    /// Application interface the experiment executes
    pub execution_id: Option<String>,
    pub user_configuration: UserConfigurationData,
    pub experiment_inputs: Vec<InputDataObject>,
    pub experiment_outputs: Vec<OutputDataObject>,
    pub experiment_status: Vec<ExperimentStatus>,
    pub errors: Vec<ErrorModel>,
    pub process_ids: Vec<String>,
}

impl ExperimentModel {
    pub fn new(
        experiment_id: impl Into<String>,
        gateway_id: impl Into<String>,
        user_name: impl Into<String>,
    ) -> Self {
        let experiment_id = experiment_id.into();
        Self {
            experiment_name: experiment_id.clone(),
            experiment_id,
            project_id: "default-project".to_string(),
            gateway_id: gateway_id.into(),
            experiment_type: ExperimentType::default(),
            user_name: user_name.into(),
            creation_time: Utc::now(),
            description: None,
            execution_id: None,
            user_configuration: UserConfigurationData::default(),
            experiment_inputs: Vec::new(),
            experiment_outputs: Vec::new(),
            experiment_status: vec![ExperimentStatus::new(ExperimentState::Created)],
            errors: Vec::new(),
            process_ids: Vec::new(),
        }
    }

    pub fn latest_status(&self) -> Option<&ExperimentStatus> {
        self.experiment_status.last()
    }

    pub fn current_state(&self) -> Option<ExperimentState> {
        self.latest_status().map(|status| status.state)
    }
}
