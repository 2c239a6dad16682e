use crate::config::KafkaConfig;

use rdkafka::error::KafkaError;
use rdkafka::producer::{Producer, ProducerContext, ThreadedProducer};
use rdkafka::{ClientConfig, Statistics};
use tracing::{debug, error, info};

pub const KAFKA_PRODUCER_QUEUE_DEPTH: &str = "kafka_producer_queue_depth";
pub const KAFKA_PRODUCER_QUEUE_BYTES: &str = "kafka_producer_queue_bytes";

/// Reports the producer queue gauges. Producer contexts call this from
/// `ClientContext::stats`.
pub fn record_producer_stats(stats: &Statistics) {
    metrics::gauge!(KAFKA_PRODUCER_QUEUE_DEPTH).set(stats.msg_cnt as f64);
    metrics::gauge!(KAFKA_PRODUCER_QUEUE_BYTES).set(stats.msg_size as f64);
}

/// Applies the connection settings shared by every client we create
/// (producers, group consumers and assign-only watermark consumers).
pub fn apply_connection_settings(client_config: &mut ClientConfig, config: &KafkaConfig) {
    client_config.set("bootstrap.servers", &config.kafka_hosts);

    if let Some(ms) = config.kafka_topic_metadata_refresh_interval_ms {
        client_config.set("topic.metadata.refresh.interval.ms", ms.to_string());
    }
    if let Some(ms) = config.kafka_metadata_max_age_ms {
        client_config.set("metadata.max.age.ms", ms.to_string());
    }
    if let Some(ms) = config.kafka_socket_timeout_ms {
        client_config.set("socket.timeout.ms", ms.to_string());
    }

    if config.kafka_tls {
        client_config
            .set("security.protocol", "ssl")
            .set("enable.ssl.certificate.verification", "false");
    };
}

pub fn producer_client_config(config: &KafkaConfig) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    apply_connection_settings(&mut client_config, config);
    client_config
        .set("statistics.interval.ms", "10000")
        .set("linger.ms", config.kafka_producer_linger_ms.to_string())
        .set(
            "message.timeout.ms",
            config.kafka_message_timeout_ms.to_string(),
        )
        .set(
            "compression.codec",
            config.kafka_compression_codec.to_owned(),
        )
        .set(
            "queue.buffering.max.kbytes",
            (config.kafka_producer_queue_mib * 1024).to_string(),
        )
        .set(
            "queue.buffering.max.messages",
            config.kafka_producer_queue_messages.to_string(),
        );

    if let Some(idempotence) = config.kafka_enable_idempotence {
        client_config.set("enable.idempotence", idempotence.to_string());
    }
    if let Some(ms) = config.kafka_retry_backoff_ms {
        client_config.set("retry.backoff.ms", ms.to_string());
    }

    client_config
}

/// Creates a producer whose delivery reports go to `context`, and checks the
/// brokers are reachable.
pub fn create_kafka_producer<C>(
    config: &KafkaConfig,
    context: C,
) -> Result<ThreadedProducer<C>, KafkaError>
where
    C: ProducerContext + 'static,
{
    let client_config = producer_client_config(config);

    debug!("rdkafka configuration: {:?}", client_config);
    let api: ThreadedProducer<C> = client_config.create_with_context(context)?;

    // "Ping" the Kafka brokers by requesting metadata
    match api
        .client()
        .fetch_metadata(None, std::time::Duration::from_secs(15))
    {
        Ok(metadata) => {
            info!(
                "Successfully connected to Kafka brokers. Found {} topics.",
                metadata.topics().len()
            );
        }
        Err(error) => {
            error!("Failed to fetch metadata from Kafka brokers: {:?}", error);
            return Err(error);
        }
    }

    Ok(api)
}
