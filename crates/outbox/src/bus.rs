//! Message bus port and implementations.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::AggregateId;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::PublishError;
use crate::event::OutboxEvent;

pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Delivery metadata attached to every relayed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageMetadata {
    /// Outbox row id; consumers deduplicate on it.
    pub message_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub content_type: &'static str,
    pub aggregate_id: AggregateId,
}

impl MessageMetadata {
    pub fn for_event(event: &OutboxEvent) -> Self {
        Self {
            message_id: event.id,
            timestamp: Utc::now(),
            event_type: event.event_type.clone(),
            content_type: CONTENT_TYPE_JSON,
            aggregate_id: event.aggregate_id,
        }
    }
}

/// Durable publish to an external broker.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        payload: &str,
        metadata: &MessageMetadata,
    ) -> Result<(), PublishError>;
}

#[async_trait]
impl<B: MessageBus + ?Sized> MessageBus for Arc<B> {
    async fn publish(
        &self,
        topic: &str,
        payload: &str,
        metadata: &MessageMetadata,
    ) -> Result<(), PublishError> {
        (**self).publish(topic, payload, metadata).await
    }
}

/// A message accepted by [`InMemoryMessageBus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredMessage {
    pub topic: String,
    pub payload: String,
    pub metadata: MessageMetadata,
}

#[derive(Debug, Default)]
struct BusState {
    delivered: Vec<DeliveredMessage>,
    failing: HashSet<Uuid>,
    unavailable: bool,
}

/// Records deliveries in memory. Failures can be scripted per message or for
/// the whole bus.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMessageBus {
    state: Arc<Mutex<BusState>>,
}

impl InMemoryMessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects every publish of the given message id.
    pub async fn fail_message(&self, message_id: Uuid) {
        self.state.lock().await.failing.insert(message_id);
    }

    /// Accepts the given message id again.
    pub async fn heal_message(&self, message_id: Uuid) {
        self.state.lock().await.failing.remove(&message_id);
    }

    /// Rejects every publish while set.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().await.unavailable = unavailable;
    }

    pub async fn delivered(&self) -> Vec<DeliveredMessage> {
        self.state.lock().await.delivered.clone()
    }

    pub async fn delivery_count(&self) -> usize {
        self.state.lock().await.delivered.len()
    }
}

#[async_trait]
impl MessageBus for InMemoryMessageBus {
    async fn publish(
        &self,
        topic: &str,
        payload: &str,
        metadata: &MessageMetadata,
    ) -> Result<(), PublishError> {
        let mut state = self.state.lock().await;
        if state.unavailable {
            return Err(PublishError::Unavailable("bus is offline".into()));
        }
        if state.failing.contains(&metadata.message_id) {
            return Err(PublishError::Rejected {
                topic: topic.to_owned(),
                reason: format!("message {} rejected", metadata.message_id),
            });
        }

        state.delivered.push(DeliveredMessage {
            topic: topic.to_owned(),
            payload: payload.to_owned(),
            metadata: metadata.clone(),
        });
        Ok(())
    }
}

/// Writes messages to the log instead of a broker.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingMessageBus;

#[async_trait]
impl MessageBus for LoggingMessageBus {
    async fn publish(
        &self,
        topic: &str,
        payload: &str,
        metadata: &MessageMetadata,
    ) -> Result<(), PublishError> {
        tracing::info!(
            %topic,
            message_id = %metadata.message_id,
            event_type = %metadata.event_type,
            aggregate_id = %metadata.aggregate_id,
            bytes = payload.len(),
            "message published"
        );
        Ok(())
    }
}

#[cfg(feature = "kafka")]
pub use kafka::KafkaMessageBus;

#[cfg(feature = "kafka")]
mod kafka {
    use std::time::Duration;

    use async_trait::async_trait;
    use rdkafka::config::ClientConfig;
    use rdkafka::message::{Header, OwnedHeaders};
    use rdkafka::producer::{FutureProducer, FutureRecord};
    use rdkafka::util::Timeout;

    use super::{MessageBus, MessageMetadata};
    use crate::error::PublishError;

    /// Kafka-compatible broker. Topic is the routing key, the message key is
    /// the aggregate id and the metadata travels in headers.
    pub struct KafkaMessageBus {
        producer: FutureProducer,
        timeout: Duration,
    }

    impl KafkaMessageBus {
        pub fn new(brokers: &str, timeout: Duration) -> Result<Self, PublishError> {
            let producer: FutureProducer = ClientConfig::new()
                .set("bootstrap.servers", brokers)
                .set("message.timeout.ms", timeout.as_millis().to_string())
                .set("acks", "all")
                .set("enable.idempotence", "true")
                .create()
                .map_err(|err| {
                    PublishError::Unavailable(format!("failed to create producer: {err}"))
                })?;

            tracing::info!(%brokers, "kafka producer created");
            Ok(Self { producer, timeout })
        }
    }

    impl std::fmt::Debug for KafkaMessageBus {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("KafkaMessageBus")
                .field("timeout", &self.timeout)
                .finish_non_exhaustive()
        }
    }

    #[async_trait]
    impl MessageBus for KafkaMessageBus {
        async fn publish(
            &self,
            topic: &str,
            payload: &str,
            metadata: &MessageMetadata,
        ) -> Result<(), PublishError> {
            let key = metadata.aggregate_id.to_string();
            let message_id = metadata.message_id.to_string();
            let timestamp = metadata.timestamp.to_rfc3339();
            let headers = OwnedHeaders::new()
                .insert(Header {
                    key: "message_id",
                    value: Some(message_id.as_str()),
                })
                .insert(Header {
                    key: "timestamp",
                    value: Some(timestamp.as_str()),
                })
                .insert(Header {
                    key: "type",
                    value: Some(metadata.event_type.as_str()),
                })
                .insert(Header {
                    key: "content_type",
                    value: Some(metadata.content_type),
                });

            let record = FutureRecord::to(topic)
                .payload(payload)
                .key(&key)
                .headers(headers);

            match self.producer.send(record, Timeout::After(self.timeout)).await {
                Ok((partition, offset)) => {
                    tracing::debug!(%topic, partition, offset, "message delivered");
                    Ok(())
                }
                Err((err, _)) => Err(PublishError::Rejected {
                    topic: topic.to_owned(),
                    reason: err.to_string(),
                }),
            }
        }
    }
}
