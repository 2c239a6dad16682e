use std::time::Duration;

use common_kafka::config::KafkaConfig;
use common_kafka::kafka_consumer::ConsumerConfigBuilder;
use rdkafka::consumer::{BaseConsumer, Consumer};
use rdkafka::error::KafkaError;
use rdkafka::metadata::MetadataTopic;
use rdkafka::types::RDKafkaErrorCode;
use tracing::debug;

use crate::broker::{MetadataError, WatermarkError, WatermarkSource};

/// Watermark and metadata queries over an assign-only consumer. It never joins
/// a group.
pub struct KafkaWatermarkSource {
    consumer: BaseConsumer,
    watermark_timeout: Duration,
    metadata_timeout: Duration,
}

impl KafkaWatermarkSource {
    pub fn new(
        consumer: BaseConsumer,
        watermark_timeout: Duration,
        metadata_timeout: Duration,
    ) -> Self {
        Self {
            consumer,
            watermark_timeout,
            metadata_timeout,
        }
    }

    pub fn from_config(
        config: &KafkaConfig,
        group_id: &str,
        watermark_timeout: Duration,
        metadata_timeout: Duration,
    ) -> Result<Self, KafkaError> {
        let consumer = ConsumerConfigBuilder::for_watermark_consumer(config, group_id)
            .build()
            .create()?;
        Ok(Self::new(consumer, watermark_timeout, metadata_timeout))
    }

    fn partitions(&self, topic: &str) -> Result<Vec<i32>, WatermarkError> {
        let metadata = self
            .consumer
            .fetch_metadata(Some(topic), self.metadata_timeout)
            .map_err(|e| watermark_error(topic, e))?;

        let topic_metadata = metadata
            .topics()
            .iter()
            .find(|t| t.name() == topic)
            .ok_or_else(|| WatermarkError::UnknownTopic {
                topic: topic.to_string(),
            })?;

        if let Some(code) = topic_error(topic_metadata) {
            return Err(watermark_error(topic, KafkaError::MetadataFetch(code)));
        }
        if topic_metadata.partitions().is_empty() {
            return Err(WatermarkError::UnknownPartition {
                topic: topic.to_string(),
            });
        }

        Ok(topic_metadata.partitions().iter().map(|p| p.id()).collect())
    }
}

impl WatermarkSource for KafkaWatermarkSource {
    /// Sum of the high watermarks over all partitions of `topic`, minus
    /// `tracked_offset`.
    fn published_message_count(
        &self,
        topic: &str,
        tracked_offset: i64,
    ) -> Result<i64, WatermarkError> {
        let mut total = 0;
        for partition in self.partitions(topic)? {
            let (_low, high) = self
                .consumer
                .fetch_watermarks(topic, partition, self.watermark_timeout)
                .map_err(|e| watermark_error(topic, e))?;
            total += high;
        }
        debug!(
            topic = topic,
            high_watermark_total = total,
            tracked_offset = tracked_offset,
            "Fetched watermarks"
        );
        Ok(total - tracked_offset)
    }

    fn load_topic_metadata(&self, topic: &str) -> Result<(), MetadataError> {
        let metadata = self
            .consumer
            .fetch_metadata(Some(topic), self.metadata_timeout)
            .map_err(|e| metadata_error(topic, e))?;

        let found = metadata.topics().iter().find(|t| t.name() == topic);
        topic_metadata_status(topic, found.map(topic_error))
    }
}

/// `found` is `None` when the response does not list the topic at all, which
/// counts as a failed load.
fn topic_metadata_status(
    topic: &str,
    found: Option<Option<RDKafkaErrorCode>>,
) -> Result<(), MetadataError> {
    match found {
        None => Err(MetadataError::Load {
            topic: topic.to_string(),
            reason: "topic missing from metadata response".to_string(),
        }),
        Some(None) => Ok(()),
        Some(Some(code)) => Err(metadata_error(topic, KafkaError::MetadataFetch(code))),
    }
}

fn topic_error(topic: &MetadataTopic) -> Option<RDKafkaErrorCode> {
    topic.error().map(RDKafkaErrorCode::from)
}

fn watermark_error(topic: &str, e: KafkaError) -> WatermarkError {
    match e.rdkafka_error_code() {
        Some(RDKafkaErrorCode::UnknownTopicOrPartition | RDKafkaErrorCode::UnknownTopic) => {
            WatermarkError::UnknownTopic {
                topic: topic.to_string(),
            }
        }
        Some(RDKafkaErrorCode::UnknownPartition) => WatermarkError::UnknownPartition {
            topic: topic.to_string(),
        },
        _ => WatermarkError::Query {
            topic: topic.to_string(),
            reason: e.to_string(),
        },
    }
}

fn metadata_error(topic: &str, e: KafkaError) -> MetadataError {
    match e.rdkafka_error_code() {
        Some(RDKafkaErrorCode::LeaderNotAvailable) => MetadataError::LeaderNotAvailable {
            topic: topic.to_string(),
        },
        _ => MetadataError::Load {
            topic: topic.to_string(),
            reason: e.to_string(),
        },
    }
}
