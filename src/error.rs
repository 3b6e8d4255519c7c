use crate::adaptor::AdaptorError;
use crate::config::ConfigurationError;
use crate::messaging::MessagingError;
use crate::monitor::MonitorError;
use crate::orchestrator::ValidationResults;
use crate::registry::RegistryError;
use crate::state_machine::StateMachineError;
use crate::workflow::WorkflowError;
use thiserror::Error;

/// Errors surfaced through the orchestrator API
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Launch validation failed: {message}")]
    LaunchValidation {
        message: String,
        results: ValidationResults,
    },

    #[error("Experiment not found: {0}")]
    ExperimentNotFound(String),

    #[error("Process not found: {0}")]
    ProcessNotFound(String),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    #[error("State transition error: {0}")]
    StateTransition(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Task execution error: {0}")]
    TaskExecution(String),

    #[error("Capacity exceeded: {0}")]
    Capacity(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    /// True for bad requests, false for system errors
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidRequest(_)
                | Self::LaunchValidation { .. }
                | Self::ExperimentNotFound(_)
                | Self::ProcessNotFound(_)
        )
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

impl From<StateMachineError> for OrchestratorError {
    fn from(error: StateMachineError) -> Self {
        match error {
            StateMachineError::Registry(e) => Self::Registry(e),
            other => Self::StateTransition(other.to_string()),
        }
    }
}

impl From<ConfigurationError> for OrchestratorError {
    fn from(error: ConfigurationError) -> Self {
        Self::Configuration(error.to_string())
    }
}

impl From<AdaptorError> for OrchestratorError {
    fn from(error: AdaptorError) -> Self {
        Self::TaskExecution(error.to_string())
    }
}

impl From<WorkflowError> for OrchestratorError {
    fn from(error: WorkflowError) -> Self {
        match error {
            WorkflowError::Registry(e) => Self::Registry(e),
            WorkflowError::Messaging(e) => Self::Messaging(e),
            WorkflowError::ProcessNotFound(id) => Self::ProcessNotFound(id),
            WorkflowError::StateTransition(e) => e.into(),
            other => Self::TaskExecution(other.to_string()),
        }
    }
}

impl From<MonitorError> for OrchestratorError {
    fn from(error: MonitorError) -> Self {
        match error {
            MonitorError::Registry(e) => Self::Registry(e),
            MonitorError::Messaging(e) => Self::Messaging(e),
            MonitorError::StateTransition(e) => e.into(),
            other => Self::Internal(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
