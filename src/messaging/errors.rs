//! # Messaging Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessagingError {
    #[error("Broker connection error: {message}")]
    Connection { message: String },

    #[error("Publish failed: {exchange}/{routing_key}: {message}")]
    PublishFailed {
        exchange: String,
        routing_key: String,
        message: String,
    },

    #[error("Queue not found: {queue_name}")]
    QueueNotFound { queue_name: String },

    #[error("Queue capacity exceeded: {queue_name} holds {current_count} messages, limit is {limit_count}")]
    QueueCapacityExceeded {
        queue_name: String,
        current_count: usize,
        limit_count: usize,
    },

    #[error("Unknown delivery tag {delivery_tag} on queue {queue_name}")]
    UnknownDelivery { queue_name: String, delivery_tag: u64 },

    #[error("Message serialization error: {message}")]
    MessageSerialization { message: String },

    #[error("Message deserialization error: {message}")]
    MessageDeserialization { message: String },

    #[error("Topic offset {offset} is beyond the end of the log ({end})")]
    InvalidOffset { offset: u64, end: u64 },

    #[error("Internal messaging error: {message}")]
    Internal { message: String },
}

impl MessagingError {
    /// Errors caused by the payload itself can never succeed on retry
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::MessageSerialization { .. }
                | Self::MessageDeserialization { .. }
                | Self::InvalidOffset { .. }
        )
    }
}

impl From<serde_json::Error> for MessagingError {
    fn from(error: serde_json::Error) -> Self {
        if error.is_data() || error.is_syntax() || error.is_eof() {
            Self::MessageDeserialization {
                message: error.to_string(),
            }
        } else {
            Self::MessageSerialization {
                message: error.to_string(),
            }
        }
    }
}

pub type MessagingResult<T> = Result<T, MessagingError>;
