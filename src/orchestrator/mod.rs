//! # Orchestrator
//!
//! The RPC surface gateways call to launch, validate and terminate
//! experiments, backed by [`OrchestratorService`].

pub mod pool;
pub mod service;
pub mod validation;

pub use pool::{BoundedWorkerPool, PoolStats};
pub use service::OrchestratorService;
pub use validation::{LaunchValidator, ValidationResult, ValidationResults, Validator};

use crate::error::Result;
use crate::models::ProcessModel;
use async_trait::async_trait;

#[async_trait]
pub trait OrchestratorApi: Send + Sync {
    /// Validate and launch every process of an experiment
    ///
    /// Returns once the launch is queued; a validation failure marks the
    /// experiment FAILED and returns [`OrchestratorError::LaunchValidation`](crate::error::OrchestratorError::LaunchValidation).
    async fn launch_experiment(&self, experiment_id: &str, gateway_id: &str) -> Result<bool>;

    /// Launch a single process; `false` when it was already launched
    async fn launch_process(&self, process_id: &str, credential_token: &str, gateway_id: &str) -> Result<bool>;

    /// Request cancellation; `false` when the experiment cannot be terminated
    async fn terminate_experiment(&self, experiment_id: &str, gateway_id: &str) -> Result<bool>;

    async fn validate_experiment(&self, experiment_id: &str) -> Result<bool>;

    async fn validate_process(&self, experiment_id: &str, processes: &[ProcessModel]) -> Result<bool>;

    fn get_api_version(&self) -> &'static str;
}
