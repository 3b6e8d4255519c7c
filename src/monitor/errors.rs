use crate::adaptor::AdaptorError;
use crate::messaging::MessagingError;
use crate::registry::RegistryError;
use crate::state_machine::StateMachineError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    #[error("Adaptor error: {0}")]
    Adaptor(#[from] AdaptorError),

    #[error("State transition failed: {0}")]
    StateTransition(#[from] StateMachineError),

    #[error("Parser {parser} could not read message: {message}")]
    Parse { parser: &'static str, message: String },

    #[error("No parser registered for key {key:?}")]
    NoParser { key: Option<String> },

    #[error("Status pipeline is closed")]
    PipelineClosed,

    #[error("Post workflow launch failed for process {process_id}: {message}")]
    PostWorkflow {
        process_id: String,
        message: String,
        transient: bool,
    },
}

impl MonitorError {
    pub fn parse(parser: &'static str, message: impl Into<String>) -> Self {
        Self::Parse {
            parser,
            message: message.into(),
        }
    }

    /// Whether handling the same status again may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Registry(e) => e.is_transient(),
            Self::Messaging(e) => e.is_retryable(),
            Self::Adaptor(e) => e.is_transient(),
            Self::StateTransition(StateMachineError::Registry(e)) => e.is_transient(),
            Self::StateTransition(StateMachineError::PublishFailed { source, .. }) => source.is_retryable(),
            Self::PostWorkflow { transient, .. } => *transient,
            Self::StateTransition(_) | Self::Parse { .. } | Self::NoParser { .. } | Self::PipelineClosed => false,
        }
    }
}


pub type MonitorResult<T> = Result<T, MonitorError>;
