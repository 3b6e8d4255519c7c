//! # Message Bus Trait
//!
//! Topic-exchange style publish/subscribe with explicit acknowledgement.
//! Consumers declare a queue bound to routing-key patterns, pull deliveries
//! with a timeout and ack or nack each one.

use super::errors::{MessagingError, MessagingResult};
use super::message::MessageContext;
use async_trait::async_trait;
use std::time::Duration;

/// A message handed to a consumer, pending acknowledgement
#[derive(Debug, Clone)]
pub struct Delivery {
    pub delivery_tag: u64,
    pub queue: String,
    pub exchange: String,
    pub routing_key: String,
    /// True when this message was handed out before and nacked with requeue
    pub redelivered: bool,
    pub payload: String,
}

impl Delivery {
    /// Decode the envelope; malformed payloads yield a non-retryable error
    pub fn message(&self) -> MessagingResult<MessageContext> {
        serde_json::from_str(&self.payload).map_err(|error| MessagingError::MessageDeserialization {
            message: format!("{} (queue {})", error, self.queue),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub queue_name: String,
    pub ready: usize,
    pub unacked: usize,
    pub total_published: u64,
    pub total_acked: u64,
    pub total_nacked: u64,
}

#[async_trait]
pub trait MessageBus: Send + Sync + 'static {
    /// Publish a message; unroutable messages are dropped like on a topic exchange
    async fn publish(&self, exchange: &str, routing_key: &str, message: &MessageContext) -> MessagingResult<()>;

    /// Publish a raw payload without envelope validation
    async fn publish_raw(&self, exchange: &str, routing_key: &str, payload: String) -> MessagingResult<()>;

    /// Declare `queue` and bind it to `exchange` with each pattern
    async fn declare_queue(&self, queue: &str, exchange: &str, bindings: &[String]) -> MessagingResult<()>;

    /// Wait up to `timeout` for the next delivery on `queue`
    async fn receive(&self, queue: &str, timeout: Duration) -> MessagingResult<Option<Delivery>>;

    async fn ack(&self, delivery: &Delivery) -> MessagingResult<()>;

    /// Reject a delivery; with `requeue` it is redelivered with `redelivered = true`
    async fn nack(&self, delivery: &Delivery, requeue: bool) -> MessagingResult<()>;

    async fn queue_stats(&self, queue: &str) -> MessagingResult<QueueStats>;

    fn provider_name(&self) -> &'static str;
}
