//! # Event Publisher
//!
//! Injected handle for publishing envelopes onto one exchange. Services
//! receive their publisher from the composition root; there is no global
//! instance.

use super::errors::{MessagingError, MessagingResult};
use super::message::{
    ExperimentStatusChangeEvent, JobIdentifier, JobStatusChangeEvent, MessageContext,
    MessageEvent, ProcessIdentifier, ProcessStatusChangeEvent, TaskIdentifier,
    TaskStatusChangeEvent,
};
use super::traits::MessageBus;
use crate::resilience::{retry_with_backoff, BackoffConfig, RetryDecision};
use crate::state_machine::{ExperimentState, JobState, ProcessState, TaskState};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct EventPublisher {
    bus: Arc<dyn MessageBus>,
    exchange: String,
}

impl std::fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPublisher")
            .field("exchange", &self.exchange)
            .field("provider", &self.bus.provider_name())
            .finish()
    }
}

impl EventPublisher {
    pub fn new(bus: Arc<dyn MessageBus>, exchange: impl Into<String>) -> Self {
        Self {
            bus,
            exchange: exchange.into(),
        }
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Publish an envelope under its event's routing key
    pub async fn publish(&self, message: &MessageContext) -> MessagingResult<()> {
        let routing_key = message.routing_key();
        self.publish_with_key(&routing_key, message).await
    }

    pub async fn publish_with_key(&self, routing_key: &str, message: &MessageContext) -> MessagingResult<()> {
        debug!(
            exchange = %self.exchange,
            routing_key,
            message_type = ?message.message_type,
            message_id = %message.message_id,
            "📤 PUBLISH"
        );
        self.bus.publish(&self.exchange, routing_key, message).await
    }

    /// Wrap an event in an envelope and publish it
    pub async fn publish_event(&self, event: MessageEvent, gateway_id: &str) -> MessagingResult<()> {
        self.publish(&MessageContext::new(event, gateway_id)).await
    }

    /// Publish, retrying transient failures with backoff
    pub async fn publish_with_retry(
        &self,
        message: &MessageContext,
        attempts: u32,
        backoff: &BackoffConfig,
    ) -> MessagingResult<()> {
        retry_with_backoff(
            backoff,
            attempts,
            "publish",
            move || self.publish(message),
            |error: &MessagingError| {
                if error.is_retryable() {
                    RetryDecision::Retry
                } else {
                    RetryDecision::Abort
                }
            },
        )
        .await
    }

    pub fn experiment_status_message(
        experiment_id: &str,
        gateway_id: &str,
        state: ExperimentState,
    ) -> MessageContext {
        MessageContext::new(
            MessageEvent::ExperimentStatusChange(ExperimentStatusChangeEvent {
                state,
                experiment_id: experiment_id.to_string(),
                gateway_id: gateway_id.to_string(),
            }),
            gateway_id,
        )
    }

    pub fn process_status_message(identity: &ProcessIdentifier, state: ProcessState) -> MessageContext {
        MessageContext::new(
            MessageEvent::ProcessStatusChange(ProcessStatusChangeEvent {
                state,
                process_identity: identity.clone(),
            }),
            identity.gateway_id.clone(),
        )
    }

    pub fn task_status_message(identity: &TaskIdentifier, state: TaskState) -> MessageContext {
        MessageContext::new(
            MessageEvent::TaskStatusChange(TaskStatusChangeEvent {
                state,
                task_identity: identity.clone(),
            }),
            identity.gateway_id.clone(),
        )
    }

    pub fn job_status_message(identity: &JobIdentifier, state: JobState) -> MessageContext {
        MessageContext::new(
            MessageEvent::JobStatusChange(JobStatusChangeEvent {
                state,
                job_identity: identity.clone(),
            }),
            identity.gateway_id.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::InMemoryMessageBus;
    use std::time::Duration;

    #[tokio::test]
    async fn test_process_status_uses_identity_routing_key() {
        let bus = Arc::new(InMemoryMessageBus::new(8));
        bus.declare_queue("status", "status_exchange", &["*.*.*".to_string()])
            .await
            .unwrap();
        let publisher = EventPublisher::new(bus.clone(), "status_exchange");

        let identity = ProcessIdentifier::new("p1", "e1", "gw");
        publisher
            .publish(&EventPublisher::process_status_message(&identity, ProcessState::Started))
            .await
            .unwrap();

        let delivery = bus.receive("status", Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(delivery.routing_key, "gw.e1.p1");
    }

    #[tokio::test]
    async fn test_publish_with_retry_recovers() {
        let bus = Arc::new(InMemoryMessageBus::new(8));
        bus.fail_next_publishes(2);
        let publisher = EventPublisher::new(bus.clone(), "status_exchange");
        let message = EventPublisher::experiment_status_message("e1", "gw", ExperimentState::Launched);

        publisher
            .publish_with_retry(&message, 3, &BackoffConfig::immediate())
            .await
            .unwrap();
        assert_eq!(bus.published().len(), 1);
    }
}
