//! Status events whose registry write succeeded but whose publish did not.
//!
//! The state machines record the event for an applied write here before
//! publishing it. A failed publish leaves it queued, and the next write for
//! the same entity (including a duplicate caused by a retry or a
//! redelivery) publishes the backlog first, in order.

use super::errors::MessagingResult;
use super::message::MessageContext;
use super::publisher::EventPublisher;
use crate::resilience::BackoffConfig;
use dashmap::DashMap;
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct PendingEvents {
    events: DashMap<String, Vec<MessageContext>>,
}

impl PendingEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, key: &str, message: MessageContext) {
        self.events.entry(key.to_string()).or_default().push(message);
    }

    pub fn has_pending(&self, key: &str) -> bool {
        self.events.get(key).is_some_and(|events| !events.is_empty())
    }

    pub fn pending_count(&self, key: &str) -> usize {
        self.events.get(key).map_or(0, |events| events.len())
    }

    /// Publish every queued event for `key`, oldest first
    ///
    /// Stops at the first failure and keeps that event and the ones after it
    /// queued ahead of anything recorded meanwhile.
    pub async fn flush(
        &self,
        key: &str,
        publisher: &EventPublisher,
        attempts: u32,
        backoff: &BackoffConfig,
    ) -> MessagingResult<usize> {
        let Some((_, queued)) = self.events.remove(key) else {
            return Ok(0);
        };

        let mut published = 0;
        let mut remaining = queued.into_iter();
        while let Some(message) = remaining.next() {
            if let Err(e) = publisher.publish_with_retry(&message, attempts, backoff).await {
                let mut keep = vec![message];
                keep.extend(remaining);
                warn!(key, unpublished = keep.len(), error = %e, "Status events left pending");
                let mut entry = self.events.entry(key.to_string()).or_default();
                keep.append(&mut *entry);
                *entry = keep;
                return Err(e);
            }
            published += 1;
        }
        if published > 1 {
            debug!(key, published, "Published pending status events");
        }
        Ok(published)
    }
}
