use crate::messaging::MessagingError;
use crate::registry::RegistryError;
use thiserror::Error;

/// Error types for state machine operations
#[derive(Error, Debug)]
pub enum StateMachineError {
    #[error("Guard condition failed: {reason}")]
    GuardFailed { reason: String },

    #[error("Invalid state transition from {from:?} to {to}")]
    InvalidTransition { from: Option<String>, to: String },

    #[error("Registry operation failed: {0}")]
    Registry(#[from] RegistryError),

    #[error("Status publish failed after {attempts} attempts: {source}")]
    PublishFailed {
        attempts: u32,
        #[source]
        source: MessagingError,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Specific error type for guard condition failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GuardError {
    #[error("Business rule violation: {rule}")]
    BusinessRuleViolation { rule: String },

    #[error("Invalid state for guard check: {state}")]
    InvalidState { state: String },
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;
pub type GuardResult<T> = Result<T, GuardError>;

pub fn business_rule_violation(rule: impl Into<String>) -> GuardError {
    GuardError::BusinessRuleViolation { rule: rule.into() }
}
