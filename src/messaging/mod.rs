//! # Messaging
//!
//! Envelopes, the message bus interface, topic routing, an injected event
//! publisher, DB event fan-out and the job status topic consumed by the
//! push monitor.

pub mod db_event;
pub mod errors;
pub mod in_memory;
pub mod message;
pub mod pending;
pub mod publisher;
pub mod routing;
pub mod topic;
pub mod traits;

pub use db_event::DbEventManager;
pub use errors::{MessagingError, MessagingResult};
pub use in_memory::{InMemoryMessageBus, PublishedMessage};
pub use message::{
    CrudType, DbEventMessage, ExperimentIdentifier, ExperimentStatusChangeEvent,
    ExperimentSubmitEvent, JobIdentifier, JobStatusChangeEvent, MessageContext, MessageEvent,
    MessageType, ParsingTriggerEvent, ProcessIdentifier, ProcessStatusChangeEvent,
    ProcessSubmitEvent, ProcessTerminateEvent, TaskIdentifier, TaskStatusChangeEvent,
};
pub use pending::PendingEvents;
pub use publisher::EventPublisher;
pub use routing::topic_matches;
pub use topic::{InMemoryTopic, TopicConsumer, TopicRecord};
pub use traits::{Delivery, MessageBus, QueueStats};
