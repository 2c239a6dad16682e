use rdkafka::mocking::MockCluster;
use rdkafka::producer::{DefaultProducerContext, ProducerContext, ThreadedProducer};

use crate::config::KafkaConfig;
use crate::kafka_producer::create_kafka_producer;

pub fn mock_kafka_config(bootstrap_servers: String) -> KafkaConfig {
    KafkaConfig {
        kafka_producer_linger_ms: 0,
        kafka_producer_queue_mib: 50,
        kafka_message_timeout_ms: 5000,
        kafka_compression_codec: "none".to_string(),
        kafka_hosts: bootstrap_servers,
        kafka_tls: false,
        kafka_topic_metadata_refresh_interval_ms: Some(30000),
        kafka_producer_queue_messages: 1000,
        kafka_metadata_max_age_ms: None,
        kafka_socket_timeout_ms: None,
        kafka_enable_idempotence: None,
        kafka_retry_backoff_ms: None,
    }
}

pub fn create_mock_kafka<C>(
    context: C,
) -> (
    MockCluster<'static, DefaultProducerContext>,
    ThreadedProducer<C>,
)
where
    C: ProducerContext + 'static,
{
    let cluster = MockCluster::new(1).expect("failed to create mock brokers");
    let config = mock_kafka_config(cluster.bootstrap_servers());

    let producer =
        create_kafka_producer(&config, context).expect("failed to create mocked kafka producer");
    (cluster, producer)
}
