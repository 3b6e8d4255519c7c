//! Launch-time validation of experiments and processes.
//!
//! The validator set is fixed at compile time: [`EXPERIMENT_VALIDATORS`]
//! run for `validate_experiment`, [`PROCESS_VALIDATORS`] for every process
//! of a launch.

use crate::models::{ExperimentModel, ProcessModel};
use crate::registry::{RegistryClient, RegistryResult};
use crate::state_machine::ExperimentState;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub validator: String,
    pub result: bool,
    pub error_details: Option<String>,
}

impl ValidationResult {
    fn pass(validator: Validator) -> Self {
        Self {
            validator: validator.name().to_string(),
            result: true,
            error_details: None,
        }
    }

    fn fail(validator: Validator, details: impl Into<String>) -> Self {
        Self {
            validator: validator.name().to_string(),
            result: false,
            error_details: Some(details.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ValidationResults {
    pub validation_state: bool,
    pub results: Vec<ValidationResult>,
}

impl ValidationResults {
    pub fn new(results: Vec<ValidationResult>) -> Self {
        Self {
            validation_state: results.iter().all(|result| result.result),
            results,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &ValidationResult> {
        self.results.iter().filter(|result| !result.result)
    }

    /// One line per failed validator
    pub fn summary(&self) -> String {
        self.failures()
            .map(|failure| {
                format!(
                    "{}: {}",
                    failure.validator,
                    failure.error_details.as_deref().unwrap_or("failed")
                )
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validator {
    /// Only CREATED or VALIDATED experiments may launch
    ExperimentState,
    /// A group resource profile is required to resolve credentials
    GroupResourceProfile,
    ApplicationInterface,
    /// Queue exists and the request fits its limits
    BatchQueue,
    RequiredInputs,
}

pub const EXPERIMENT_VALIDATORS: &[Validator] = &[
    Validator::ExperimentState,
    Validator::GroupResourceProfile,
    Validator::BatchQueue,
    Validator::RequiredInputs,
];

pub const PROCESS_VALIDATORS: &[Validator] = &[
    Validator::GroupResourceProfile,
    Validator::ApplicationInterface,
    Validator::BatchQueue,
    Validator::RequiredInputs,
];

impl Validator {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ExperimentState => "experiment_state",
            Self::GroupResourceProfile => "group_resource_profile",
            Self::ApplicationInterface => "application_interface",
            Self::BatchQueue => "batch_queue",
            Self::RequiredInputs => "required_inputs",
        }
    }
}

/// Resource request checked by the batch queue validator
struct ResourceRequest<'a> {
    compute_resource_id: Option<&'a str>,
    queue_name: Option<&'a str>,
    node_count: u32,
    cpu_count: u32,
    wall_time_minutes: u32,
}

#[derive(Clone)]
pub struct LaunchValidator {
    registry: Arc<dyn RegistryClient>,
}

impl std::fmt::Debug for LaunchValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchValidator").finish_non_exhaustive()
    }
}

impl LaunchValidator {
    pub fn new(registry: Arc<dyn RegistryClient>) -> Self {
        Self { registry }
    }

    pub async fn validate_experiment(&self, experiment: &ExperimentModel) -> RegistryResult<ValidationResults> {
        let config = &experiment.user_configuration;
        let request = ResourceRequest {
            compute_resource_id: config.resource_host_id.as_deref(),
            queue_name: config.queue_name.as_deref(),
            node_count: config.node_count,
            cpu_count: config.total_cpu_count,
            wall_time_minutes: config.wall_time_limit,
        };

        let mut results = Vec::with_capacity(EXPERIMENT_VALIDATORS.len());
        for &validator in EXPERIMENT_VALIDATORS {
            let result = match validator {
                Validator::ExperimentState => match experiment.current_state() {
                    Some(ExperimentState::Created | ExperimentState::Validated) => ValidationResult::pass(validator),
                    state => ValidationResult::fail(
                        validator,
                        format!("experiment is in state {state:?}, expected CREATED"),
                    ),
                },
                Validator::GroupResourceProfile => {
                    self.check_group_profile(validator, config.group_resource_profile_id.as_deref())
                        .await?
                }
                Validator::ApplicationInterface => match &experiment.execution_id {
                    Some(_) => ValidationResult::pass(validator),
                    None => ValidationResult::fail(validator, "no application interface"),
                },
                Validator::BatchQueue => self.check_batch_queue(validator, &request).await?,
                Validator::RequiredInputs => {
                    let missing: Vec<&str> = experiment
                        .experiment_inputs
                        .iter()
                        .filter(|input| input.is_required && input.values().is_empty())
                        .map(|input| input.name.as_str())
                        .collect();
                    required_inputs(validator, &missing)
                }
            };
            results.push(result);
        }
        Ok(ValidationResults::new(results))
    }

    pub async fn validate_process(
        &self,
        experiment: &ExperimentModel,
        process: &ProcessModel,
    ) -> RegistryResult<ValidationResults> {
        let schedule = &process.resource_schedule;
        let request = ResourceRequest {
            compute_resource_id: schedule
                .resource_host_id
                .as_deref()
                .or(process.compute_resource_id.as_deref()),
            queue_name: schedule.queue_name.as_deref(),
            node_count: schedule.node_count,
            cpu_count: schedule.total_cpu_count,
            wall_time_minutes: schedule.wall_time_limit,
        };

        let mut results = Vec::with_capacity(PROCESS_VALIDATORS.len());
        for &validator in PROCESS_VALIDATORS {
            let result = match validator {
                Validator::ExperimentState => ValidationResult::pass(validator),
                Validator::GroupResourceProfile => {
                    let profile = process
                        .group_resource_profile_id
                        .as_deref()
                        .or(experiment.user_configuration.group_resource_profile_id.as_deref());
                    self.check_group_profile(validator, profile).await?
                }
                Validator::ApplicationInterface => match &process.application_interface_id {
                    Some(_) => ValidationResult::pass(validator),
                    None => ValidationResult::fail(validator, "application interface id is not set"),
                },
                Validator::BatchQueue => self.check_batch_queue(validator, &request).await?,
                Validator::RequiredInputs => {
                    let missing: Vec<&str> = process
                        .process_inputs
                        .iter()
                        .filter(|input| input.is_required && input.values().is_empty())
                        .map(|input| input.name.as_str())
                        .collect();
                    required_inputs(validator, &missing)
                }
            };
            results.push(result);
        }
        Ok(ValidationResults::new(results))
    }

    async fn check_group_profile(&self, validator: Validator, profile_id: Option<&str>) -> RegistryResult<ValidationResult> {
        let Some(profile_id) = profile_id else {
            return Ok(ValidationResult::fail(validator, "no group resource profile configured"));
        };
        Ok(match self.registry.get_group_resource_profile(profile_id).await? {
            Some(_) => ValidationResult::pass(validator),
            None => ValidationResult::fail(validator, format!("group resource profile {profile_id} not found")),
        })
    }

    async fn check_batch_queue(&self, validator: Validator, request: &ResourceRequest<'_>) -> RegistryResult<ValidationResult> {
        let Some(resource_id) = request.compute_resource_id else {
            return Ok(ValidationResult::fail(validator, "no compute resource selected"));
        };
        let Some(resource) = self.registry.get_compute_resource(resource_id).await? else {
            return Ok(ValidationResult::fail(validator, format!("compute resource {resource_id} not found")));
        };
        let Some(queue_name) = request.queue_name else {
            return Ok(ValidationResult::pass(validator));
        };
        let Some(queue) = resource.queue(queue_name) else {
            return Ok(ValidationResult::fail(
                validator,
                format!("queue {queue_name} does not exist on {resource_id}"),
            ));
        };

        let mut problems = Vec::new();
        if queue.max_run_time > 0 && request.wall_time_minutes > queue.max_run_time {
            problems.push(format!(
                "wall time {} exceeds queue limit {}",
                request.wall_time_minutes, queue.max_run_time
            ));
        }
        if queue.max_nodes > 0 && request.node_count > queue.max_nodes {
            problems.push(format!("node count {} exceeds queue limit {}", request.node_count, queue.max_nodes));
        }
        if queue.max_processors > 0 && request.cpu_count > queue.max_processors {
            problems.push(format!(
                "cpu count {} exceeds queue limit {}",
                request.cpu_count, queue.max_processors
            ));
        }
        Ok(if problems.is_empty() {
            ValidationResult::pass(validator)
        } else {
            ValidationResult::fail(validator, problems.join(", "))
        })
    }
}

fn required_inputs(validator: Validator, missing: &[&str]) -> ValidationResult {
    if missing.is_empty() {
        ValidationResult::pass(validator)
    } else {
        ValidationResult::fail(validator, format!("required inputs without value: {}", missing.join(", ")))
    }
}
