//! DB event fan-out between services.
//!
//! Publishers and subscribers register by service name. An event from a
//! publisher carries a routing key made of its subscribers joined with dots,
//! and each subscriber's queue binds `#.<service>.#`, so one publish reaches
//! every registered subscriber.

use super::errors::MessagingResult;
use super::message::{CrudType, DbEventMessage, MessageContext, MessageEvent};
use super::traits::MessageBus;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

pub struct DbEventManager {
    bus: Arc<dyn MessageBus>,
    exchange: String,
    subscribers: DashMap<String, Vec<String>>,
}

impl DbEventManager {
    pub fn new(bus: Arc<dyn MessageBus>, exchange: impl Into<String>) -> Self {
        Self {
            bus,
            exchange: exchange.into(),
            subscribers: DashMap::new(),
        }
    }

    /// Queue name a subscriber service consumes from
    pub fn queue_name(service: &str) -> String {
        format!("{}.db_event", service.to_ascii_lowercase())
    }

    pub fn binding_for(service: &str) -> String {
        format!("#.{}.#", service.to_ascii_lowercase())
    }

    /// Register `subscriber` for events published by `publisher` and declare its queue
    pub async fn register_subscriber(&self, publisher: &str, subscriber: &str) -> MessagingResult<()> {
        self.bus
            .declare_queue(
                &Self::queue_name(subscriber),
                &self.exchange,
                &[Self::binding_for(subscriber)],
            )
            .await?;

        let mut entry = self.subscribers.entry(publisher.to_ascii_lowercase()).or_default();
        let subscriber = subscriber.to_ascii_lowercase();
        if !entry.contains(&subscriber) {
            entry.push(subscriber.clone());
        }
        info!(publisher, subscriber = %subscriber, "📚 DB_EVENT: Subscriber registered");
        Ok(())
    }

    pub fn unregister_subscriber(&self, publisher: &str, subscriber: &str) {
        if let Some(mut entry) = self.subscribers.get_mut(&publisher.to_ascii_lowercase()) {
            entry.retain(|s| !s.eq_ignore_ascii_case(subscriber));
        }
    }

    /// Dot-joined subscriber list for a publisher, `None` when nobody listens
    pub fn routing_key(&self, publisher: &str) -> Option<String> {
        self.subscribers
            .get(&publisher.to_ascii_lowercase())
            .filter(|subs| !subs.is_empty())
            .map(|subs| subs.join("."))
    }

    /// Publish an entity change to every subscriber of `publisher`
    ///
    /// Returns false without publishing when the publisher has no subscribers.
    pub async fn publish(
        &self,
        publisher: &str,
        entity_type: &str,
        crud_type: CrudType,
        entity: serde_json::Value,
        gateway_id: &str,
    ) -> MessagingResult<bool> {
        let Some(routing_key) = self.routing_key(publisher) else {
            debug!(publisher, entity_type, "No DB event subscribers, skipping publish");
            return Ok(false);
        };

        let message = MessageContext::new(
            MessageEvent::DbEvent(DbEventMessage {
                publisher_service: publisher.to_string(),
                entity_type: entity_type.to_string(),
                crud_type,
                entity,
            }),
            gateway_id,
        );
        self.bus.publish(&self.exchange, &routing_key, &message).await?;
        Ok(true)
    }
}
