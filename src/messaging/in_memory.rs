//! # In-Memory Message Bus
//!
//! Thread-safe topic exchange used by tests and standalone deployments.
//!
//! - **Bindings**: each queue is bound to an exchange with AMQP patterns
//! - **Bounded queues**: publishing into a full queue fails with
//!   `QueueCapacityExceeded` instead of growing without limit
//! - **Redelivery**: nack with requeue puts the message back at the front

use super::errors::{MessagingError, MessagingResult};
use super::message::MessageContext;
use super::routing::topic_matches;
use super::traits::{Delivery, MessageBus, QueueStats};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, trace};

#[derive(Debug)]
struct InMemoryQueue {
    exchange: String,
    bindings: Vec<String>,
    ready: VecDeque<Delivery>,
    unacked: HashMap<u64, Delivery>,
    notify: Arc<Notify>,
    total_published: u64,
    total_acked: u64,
    total_nacked: u64,
}

impl InMemoryQueue {
    fn new(exchange: &str) -> Self {
        Self {
            exchange: exchange.to_string(),
            bindings: Vec::new(),
            ready: VecDeque::new(),
            unacked: HashMap::new(),
            notify: Arc::new(Notify::new()),
            total_published: 0,
            total_acked: 0,
            total_nacked: 0,
        }
    }

    fn accepts(&self, exchange: &str, routing_key: &str) -> bool {
        self.exchange == exchange
            && self
                .bindings
                .iter()
                .any(|pattern| topic_matches(pattern, routing_key))
    }
}

/// A message as it was published, kept for inspection in tests
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub exchange: String,
    pub routing_key: String,
    pub payload: String,
}

impl PublishedMessage {
    pub fn message(&self) -> MessagingResult<MessageContext> {
        Ok(serde_json::from_str(&self.payload)?)
    }
}

#[derive(Debug)]
pub struct InMemoryMessageBus {
    queues: Mutex<HashMap<String, InMemoryQueue>>,
    published: Mutex<Vec<PublishedMessage>>,
    next_tag: AtomicU64,
    queue_capacity: usize,
    failing_publishes: AtomicU32,
}

impl InMemoryMessageBus {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            published: Mutex::new(Vec::new()),
            next_tag: AtomicU64::new(1),
            queue_capacity,
            failing_publishes: AtomicU32::new(0),
        }
    }

    /// Make the next `count` publishes fail with a connection error
    pub fn fail_next_publishes(&self, count: u32) {
        self.failing_publishes.store(count, Ordering::SeqCst);
    }

    /// Everything published so far, routed or not
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().clone()
    }

    pub fn published_to(&self, exchange: &str) -> Vec<MessageContext> {
        self.published
            .lock()
            .iter()
            .filter(|message| message.exchange == exchange)
            .filter_map(|message| message.message().ok())
            .collect()
    }

    fn take_failure(&self) -> bool {
        self.failing_publishes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
    }

    fn route(&self, exchange: &str, routing_key: &str, payload: String) -> MessagingResult<usize> {
        let mut queues = self.queues.lock();

        // check capacity everywhere first so a rejected publish lands nowhere
        for (name, queue) in queues.iter() {
            if queue.accepts(exchange, routing_key) && queue.ready.len() >= self.queue_capacity {
                return Err(MessagingError::QueueCapacityExceeded {
                    queue_name: name.clone(),
                    current_count: queue.ready.len(),
                    limit_count: self.queue_capacity,
                });
            }
        }

        let mut routed = 0;
        for (name, queue) in queues.iter_mut() {
            if !queue.accepts(exchange, routing_key) {
                continue;
            }
            queue.ready.push_back(Delivery {
                delivery_tag: self.next_tag.fetch_add(1, Ordering::SeqCst),
                queue: name.clone(),
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                redelivered: false,
                payload: payload.clone(),
            });
            queue.total_published += 1;
            queue.notify.notify_one();
            routed += 1;
        }

        self.published.lock().push(PublishedMessage {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            payload,
        });
        Ok(routed)
    }

    fn queue_notify(&self, queue: &str) -> MessagingResult<Arc<Notify>> {
        self.queues
            .lock()
            .get(queue)
            .map(|q| Arc::clone(&q.notify))
            .ok_or_else(|| MessagingError::QueueNotFound {
                queue_name: queue.to_string(),
            })
    }

    fn pop_ready(&self, queue: &str) -> MessagingResult<Option<Delivery>> {
        let mut queues = self.queues.lock();
        let q = queues.get_mut(queue).ok_or_else(|| MessagingError::QueueNotFound {
            queue_name: queue.to_string(),
        })?;
        Ok(q.ready.pop_front().map(|delivery| {
            q.unacked.insert(delivery.delivery_tag, delivery.clone());
            delivery
        }))
    }
}

impl Default for InMemoryMessageBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl MessageBus for InMemoryMessageBus {
    async fn publish(&self, exchange: &str, routing_key: &str, message: &MessageContext) -> MessagingResult<()> {
        let payload = serde_json::to_string(message).map_err(|e| MessagingError::MessageSerialization {
            message: e.to_string(),
        })?;
        self.publish_raw(exchange, routing_key, payload).await
    }

    async fn publish_raw(&self, exchange: &str, routing_key: &str, payload: String) -> MessagingResult<()> {
        if self.take_failure() {
            return Err(MessagingError::PublishFailed {
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                message: "in-memory bus configured to fail".to_string(),
            });
        }
        let routed = self.route(exchange, routing_key, payload)?;
        trace!(exchange, routing_key, routed, "Published message");
        Ok(())
    }

    async fn declare_queue(&self, queue: &str, exchange: &str, bindings: &[String]) -> MessagingResult<()> {
        let mut queues = self.queues.lock();
        let entry = queues
            .entry(queue.to_string())
            .or_insert_with(|| InMemoryQueue::new(exchange));
        if entry.exchange != exchange {
            return Err(MessagingError::Internal {
                message: format!(
                    "queue {queue} is bound to exchange {}, not {exchange}",
                    entry.exchange
                ),
            });
        }
        for binding in bindings {
            if !entry.bindings.contains(binding) {
                entry.bindings.push(binding.clone());
            }
        }
        debug!(queue, exchange, ?bindings, "Declared queue");
        Ok(())
    }

    async fn receive(&self, queue: &str, timeout: Duration) -> MessagingResult<Option<Delivery>> {
        let notify = self.queue_notify(queue)?;
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(delivery) = self.pop_ready(queue)? {
                return Ok(Some(delivery));
            }
            if tokio::time::timeout_at(deadline, notify.notified()).await.is_err() {
                return self.pop_ready(queue);
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> MessagingResult<()> {
        let mut queues = self.queues.lock();
        let queue = queues
            .get_mut(&delivery.queue)
            .ok_or_else(|| MessagingError::QueueNotFound {
                queue_name: delivery.queue.clone(),
            })?;
        queue
            .unacked
            .remove(&delivery.delivery_tag)
            .ok_or_else(|| MessagingError::UnknownDelivery {
                queue_name: delivery.queue.clone(),
                delivery_tag: delivery.delivery_tag,
            })?;
        queue.total_acked += 1;
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> MessagingResult<()> {
        let mut queues = self.queues.lock();
        let queue = queues
            .get_mut(&delivery.queue)
            .ok_or_else(|| MessagingError::QueueNotFound {
                queue_name: delivery.queue.clone(),
            })?;
        let mut pending = queue
            .unacked
            .remove(&delivery.delivery_tag)
            .ok_or_else(|| MessagingError::UnknownDelivery {
                queue_name: delivery.queue.clone(),
                delivery_tag: delivery.delivery_tag,
            })?;
        queue.total_nacked += 1;
        if requeue {
            pending.redelivered = true;
            pending.delivery_tag = self.next_tag.fetch_add(1, Ordering::SeqCst);
            queue.ready.push_front(pending);
            queue.notify.notify_one();
        }
        Ok(())
    }

    async fn queue_stats(&self, queue: &str) -> MessagingResult<QueueStats> {
        let queues = self.queues.lock();
        let q = queues.get(queue).ok_or_else(|| MessagingError::QueueNotFound {
            queue_name: queue.to_string(),
        })?;
        Ok(QueueStats {
            queue_name: queue.to_string(),
            ready: q.ready.len(),
            unacked: q.unacked.len(),
            total_published: q.total_published,
            total_acked: q.total_acked,
            total_nacked: q.total_nacked,
        })
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}
