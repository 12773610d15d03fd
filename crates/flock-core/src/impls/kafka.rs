//! Kafka adapters (feature `kafka`).
//!
//! - `KafkaEventPublisher`: key = author, payload = message JSON
//! - `KafkaSubscription`: manual offset commit. `ack` と `nack` の両方で commit する
//!   （nack された message はすでに dead-letter に退避済みで、再処理は reprocessor が担う）

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::OwnedMessage;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::{ClientConfig, Message as _, Offset, TopicPartitionList};
use tracing::{error, info, warn};

use crate::config::BrokerConfig;
use crate::domain::{EventEnvelope, PublishError, SubscriptionError, UserId};
use crate::ports::{EventDelivery, EventPublisher, EventSubscription};

const SEND_TIMEOUT: Duration = Duration::from_secs(2);

pub struct KafkaEventPublisher {
    producer: FutureProducer,
    topic: String,
}

impl KafkaEventPublisher {
    /// Producer settings: `acks=all`, idempotent writes.
    pub fn new(config: &BrokerConfig) -> Result<Self, PublishError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .set("message.timeout.ms", "5000")
            .create()?;

        info!(topic = %config.topic, brokers = %config.brokers, "kafka producer initialized");
        Ok(Self {
            producer,
            topic: config.topic.clone(),
        })
    }
}

#[async_trait]
impl EventPublisher for KafkaEventPublisher {
    async fn publish(&self, key: &UserId, payload: &[u8]) -> Result<(), PublishError> {
        let record = FutureRecord::to(&self.topic)
            .key(key.as_str())
            .payload(payload);

        match self.producer.send(record, Timeout::After(SEND_TIMEOUT)).await {
            Ok((partition, offset)) => {
                info!(key = %key, partition, offset, "event persisted to kafka");
                Ok(())
            }
            Err((e, _)) => {
                error!(key = %key, error = %e, "kafka send failed");
                Err(e.into())
            }
        }
    }
}

pub struct KafkaSubscription {
    consumer: Arc<StreamConsumer>,
}

impl KafkaSubscription {
    pub fn new(config: &BrokerConfig) -> Result<Self, SubscriptionError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("allow.auto.create.topics", "true")
            .create()
            .map_err(|e| SubscriptionError::Transport(e.to_string()))?;

        consumer
            .subscribe(&[config.topic.as_str()])
            .map_err(|e| SubscriptionError::Transport(e.to_string()))?;

        info!(topic = %config.topic, group = %config.group_id, "kafka consumer subscribed");
        Ok(Self {
            consumer: Arc::new(consumer),
        })
    }
}

#[async_trait]
impl EventSubscription for KafkaSubscription {
    async fn receive(&self) -> Result<Option<Box<dyn EventDelivery>>, SubscriptionError> {
        let message = self
            .consumer
            .recv()
            .await
            .map_err(|e| SubscriptionError::Transport(e.to_string()))?
            .detach();

        let key = message
            .key()
            .map(|k| UserId::new(String::from_utf8_lossy(k)))
            .unwrap_or_else(|| UserId::new(""));
        let payload = message.payload().map(<[u8]>::to_vec).unwrap_or_default();

        Ok(Some(Box::new(KafkaDelivery {
            envelope: EventEnvelope::new(key, payload),
            message,
            consumer: Arc::clone(&self.consumer),
        })))
    }
}

struct KafkaDelivery {
    envelope: EventEnvelope,
    message: OwnedMessage,
    consumer: Arc<StreamConsumer>,
}

impl KafkaDelivery {
    fn commit(&self) -> Result<(), SubscriptionError> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(
            self.message.topic(),
            self.message.partition(),
            Offset::Offset(self.message.offset() + 1),
        )
        .map_err(|e| SubscriptionError::Transport(e.to_string()))?;

        self.consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(|e| SubscriptionError::Transport(e.to_string()))
    }
}

#[async_trait]
impl EventDelivery for KafkaDelivery {
    fn envelope(&self) -> &EventEnvelope {
        &self.envelope
    }

    async fn ack(self: Box<Self>) -> Result<(), SubscriptionError> {
        self.commit()
    }

    async fn nack(self: Box<Self>, reason: String) -> Result<(), SubscriptionError> {
        warn!(
            partition = self.message.partition(),
            offset = self.message.offset(),
            reason = %reason,
            "fan-out failed, committing offset (payload is dead-lettered)"
        );
        self.commit()
    }
}
