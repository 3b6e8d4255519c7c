use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Resource manager flavour running on a compute resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobManagerType {
    Pbs,
    Slurm,
    Fork,
}

impl fmt::Display for JobManagerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pbs => write!(f, "pbs"),
            Self::Slurm => write!(f, "slurm"),
            Self::Fork => write!(f, "fork"),
        }
    }
}

impl std::str::FromStr for JobManagerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pbs" => Ok(Self::Pbs),
            "slurm" => Ok(Self::Slurm),
            "fork" => Ok(Self::Fork),
            _ => Err(format!("Invalid job manager type: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchQueue {
    pub queue_name: String,
    pub max_nodes: u32,
    pub max_processors: u32,
    /// Minutes
    pub max_run_time: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeResourceDescription {
    pub compute_resource_id: String,
    pub host_name: String,
    pub job_manager: JobManagerType,
    pub scratch_location: String,
    pub batch_queues: Vec<BatchQueue>,
}

impl ComputeResourceDescription {
    pub fn queue(&self, name: &str) -> Option<&BatchQueue> {
        self.batch_queues.iter().find(|queue| queue.queue_name == name)
    }
}

/// Group-level preferences for one compute resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GroupComputeResourcePreference {
    pub compute_resource_id: String,
    pub login_user_name: Option<String>,
    pub scratch_location: Option<String>,
    pub resource_specific_credential_store_token: Option<String>,
    pub allocation_project_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GroupResourceProfile {
    pub group_resource_profile_id: String,
    pub gateway_id: String,
    pub default_credential_store_token: Option<String>,
    pub compute_preferences: HashMap<String, GroupComputeResourcePreference>,
}

impl GroupResourceProfile {
    /// Resource-specific token when configured, the profile default otherwise
    pub fn credential_token_for(&self, compute_resource_id: Option<&str>) -> Option<&str> {
        compute_resource_id
            .and_then(|id| self.compute_preferences.get(id))
            .and_then(|pref| pref.resource_specific_credential_store_token.as_deref())
            .filter(|token| !token.trim().is_empty())
            .or_else(|| {
                self.default_credential_store_token
                    .as_deref()
                    .filter(|token| !token.trim().is_empty())
            })
    }
}

/// How an application is installed on a compute resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ApplicationDeployment {
    pub app_deployment_id: String,
    pub app_module_id: String,
    pub compute_host_id: String,
    pub executable_path: String,
    pub module_load_commands: Vec<String>,
    pub pre_job_commands: Vec<String>,
    pub post_job_commands: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> GroupResourceProfile {
        let mut profile = GroupResourceProfile {
            group_resource_profile_id: "grp-1".to_string(),
            gateway_id: "gw".to_string(),
            default_credential_store_token: Some("default-token".to_string()),
            compute_preferences: HashMap::new(),
        };
        profile.compute_preferences.insert(
            "stampede".to_string(),
            GroupComputeResourcePreference {
                compute_resource_id: "stampede".to_string(),
                resource_specific_credential_store_token: Some("stampede-token".to_string()),
                ..Default::default()
            },
        );
        profile
    }

    #[test]
    fn test_resource_specific_token_wins() {
        assert_eq!(profile().credential_token_for(Some("stampede")), Some("stampede-token"));
    }

    #[test]
    fn test_falls_back_to_default_token() {
        assert_eq!(profile().credential_token_for(Some("comet")), Some("default-token"));
        assert_eq!(profile().credential_token_for(None), Some("default-token"));
    }

    #[test]
    fn test_no_token_anywhere() {
        let mut profile = profile();
        profile.default_credential_store_token = None;
        assert_eq!(profile.credential_token_for(Some("comet")), None);
    }
}
