use std::sync::{Arc, Weak};

use rdkafka::{
    consumer::{Consumer, StreamConsumer},
    error::KafkaError,
    ClientConfig, Message,
};
use serde::de::DeserializeOwned;

use crate::config::{ConsumerConfig, KafkaConfig};

/// A consumer over a single topic, acting as the pipeline's checkpoint
/// manager: offsets are never auto-stored, only `Offset::store` marks a
/// position as fully processed, and the periodic auto-commit then makes
/// it durable under the consumer group's identity.
#[derive(Clone)]
pub struct SingleTopicConsumer {
    inner: Arc<Inner>,
}

struct Inner {
    consumer: StreamConsumer,
    topic: String,
}

/// How the payload of a received message decoded. Malformed and empty
/// payloads are not errors: callers get the type's default value and
/// decide what to do with it.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DecodeOutcome {
    Decoded,
    EmptyPayload,
    Malformed,
}

#[derive(Debug, thiserror::Error)]
pub enum OffsetErr {
    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),
    #[error("Consumer gone")]
    Gone,
}

impl SingleTopicConsumer {
    pub fn new(
        common_config: KafkaConfig,
        consumer_config: ConsumerConfig,
    ) -> Result<Self, KafkaError> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &common_config.kafka_hosts)
            .set("statistics.interval.ms", "10000")
            .set("group.id", consumer_config.kafka_consumer_group)
            .set(
                "auto.offset.reset",
                &consumer_config.kafka_consumer_offset_reset,
            )
            .set(
                "auto.commit.interval.ms",
                consumer_config
                    .kafka_consumer_auto_commit_interval_ms
                    .to_string(),
            );

        // Offsets are only stored once the corresponding batch has been
        // durably written, so a crash replays from the last stored position.
        client_config.set("enable.auto.offset.store", "false");

        if common_config.kafka_tls {
            client_config
                .set("security.protocol", "ssl")
                .set("enable.ssl.certificate.verification", "false");
        };

        let consumer: StreamConsumer = client_config.create()?;
        consumer.subscribe(&[consumer_config.kafka_consumer_topic.as_str()])?;

        let inner = Inner {
            consumer,
            topic: consumer_config.kafka_consumer_topic,
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Receive one message and decode its payload as JSON, leniently:
    /// empty or undecodable payloads yield `T::default()` alongside the
    /// outcome tag, so a bad message can still flow through the pipeline
    /// and have its offset stored like any other.
    pub async fn json_recv_lenient<T>(&self) -> Result<(T, DecodeOutcome, Offset), KafkaError>
    where
        T: DeserializeOwned + Default,
    {
        let message = self.inner.consumer.recv().await?;

        let offset = Offset {
            handle: Arc::downgrade(&self.inner),
            partition: message.partition(),
            offset: message.offset(),
        };

        let Some(payload) = message.payload() else {
            return Ok((T::default(), DecodeOutcome::EmptyPayload, offset));
        };

        match serde_json::from_slice(payload) {
            Ok(p) => Ok((p, DecodeOutcome::Decoded, offset)),
            Err(_) => Ok((T::default(), DecodeOutcome::Malformed, offset)),
        }
    }
}

pub struct Offset {
    handle: Weak<Inner>,
    partition: i32,
    offset: i64,
}

impl Offset {
    pub fn store(self) -> Result<(), OffsetErr> {
        let inner = self.handle.upgrade().ok_or(OffsetErr::Gone)?;
        inner
            .consumer
            .store_offset(&inner.topic, self.partition, self.offset)?;
        Ok(())
    }
}
