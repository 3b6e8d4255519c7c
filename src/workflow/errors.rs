use crate::adaptor::AdaptorError;
use crate::messaging::MessagingError;
use crate::registry::RegistryError;
use crate::state_machine::StateMachineError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Adding dependency {from} -> {to} would create a cycle")]
    CycleDetected { from: String, to: String },

    #[error("Workflow node not found: {0}")]
    UnknownNode(String),

    #[error("Invalid workflow definition: {0}")]
    InvalidDefinition(String),

    #[error("Process not found: {0}")]
    ProcessNotFound(String),

    #[error("Missing {what} for process {process_id}")]
    MissingResource { what: &'static str, process_id: String },

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    #[error("Adaptor error: {0}")]
    Adaptor(#[from] AdaptorError),

    #[error("State transition failed: {0}")]
    StateTransition(#[from] StateMachineError),
}

impl WorkflowError {
    pub fn missing(what: &'static str, process_id: impl Into<String>) -> Self {
        Self::MissingResource {
            what,
            process_id: process_id.into(),
        }
    }

    /// Worth another attempt of the same task
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Registry(e) => e.is_transient(),
            Self::Messaging(e) => e.is_retryable(),
            Self::Adaptor(e) => e.is_transient(),
            Self::StateTransition(StateMachineError::Registry(e)) => e.is_transient(),
            Self::StateTransition(StateMachineError::PublishFailed { .. }) => true,
            _ => false,
        }
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;
