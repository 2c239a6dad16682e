use rdkafka::ClientConfig;

use crate::config::{ConsumerConfig, KafkaConfig};
use crate::kafka_producer::apply_connection_settings;

/// Builds rdkafka consumer configuration for the two kinds of consumers the
/// pipeline client needs:
/// - `for_group_consumer`: joins a consumer group. Auto commit and auto offset
///   store are always off, offsets are committed explicitly.
/// - `for_watermark_consumer`: assign-only consumer used to query watermarks and
///   metadata. `group.id` is still required by rdkafka but the consumer never
///   joins the group.
pub struct ConsumerConfigBuilder {
    config: ClientConfig,
}

impl ConsumerConfigBuilder {
    pub fn for_group_consumer(kafka: &KafkaConfig, consumer: &ConsumerConfig) -> Self {
        let mut config = ClientConfig::new();
        apply_connection_settings(&mut config, kafka);

        config
            .set("group.id", &consumer.kafka_consumer_group)
            .set("auto.offset.reset", &consumer.kafka_consumer_offset_reset)
            .set("enable.auto.offset.store", "false")
            .set(
                "enable.auto.commit",
                consumer.kafka_consumer_auto_commit.to_string(),
            )
            .set("session.timeout.ms", "60000")
            .set("heartbeat.interval.ms", "5000")
            .set("max.poll.interval.ms", "300000");

        Self { config }
    }

    pub fn for_watermark_consumer(kafka: &KafkaConfig, group_id: &str) -> Self {
        let mut config = ClientConfig::new();
        apply_connection_settings(&mut config, kafka);
        config.set("group.id", group_id);

        Self { config }
    }

    /// Add any custom configuration
    pub fn set(mut self, key: &str, value: &str) -> Self {
        self.config.set(key, value);
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kafka_config() -> KafkaConfig {
        KafkaConfig {
            kafka_producer_linger_ms: 0,
            kafka_producer_queue_mib: 50,
            kafka_producer_queue_messages: 1000,
            kafka_message_timeout_ms: 5000,
            kafka_compression_codec: "none".to_string(),
            kafka_tls: true,
            kafka_hosts: "kafka:9092".to_string(),
            kafka_topic_metadata_refresh_interval_ms: None,
            kafka_metadata_max_age_ms: Some(1000),
            kafka_socket_timeout_ms: None,
            kafka_enable_idempotence: None,
            kafka_retry_backoff_ms: None,
        }
    }

    #[test]
    fn test_group_consumer_never_auto_stores_offsets() {
        let consumer = ConsumerConfig {
            kafka_consumer_group: "pipeline".to_string(),
            kafka_consumer_offset_reset: "latest".to_string(),
            kafka_consumer_auto_commit: false,
        };

        let config = ConsumerConfigBuilder::for_group_consumer(&kafka_config(), &consumer).build();

        assert_eq!(config.get("bootstrap.servers"), Some("kafka:9092"));
        assert_eq!(config.get("group.id"), Some("pipeline"));
        assert_eq!(config.get("auto.offset.reset"), Some("latest"));
        assert_eq!(config.get("enable.auto.offset.store"), Some("false"));
        assert_eq!(config.get("enable.auto.commit"), Some("false"));
        assert_eq!(config.get("security.protocol"), Some("ssl"));
        assert_eq!(config.get("metadata.max.age.ms"), Some("1000"));
        // broker-side group settings are rejected by librdkafka
        assert_eq!(config.get("group.initial.rebalance.delay.ms"), None);
    }

    #[test]
    fn test_watermark_consumer_has_no_group_settings() {
        let config =
            ConsumerConfigBuilder::for_watermark_consumer(&kafka_config(), "pipeline-watermarks")
                .set("client.id", "watermarks")
                .build();

        assert_eq!(config.get("group.id"), Some("pipeline-watermarks"));
        assert_eq!(config.get("client.id"), Some("watermarks"));
        assert_eq!(config.get("session.timeout.ms"), None);
        assert_eq!(config.get("enable.auto.commit"), None);
    }
}
