//! rdkafka-backed implementations of the [`crate::broker`] traits, and
//! constructors wiring them from [`Config`].

pub mod committer;
pub mod context;
pub mod membership;
pub mod publisher;
pub mod watermark;

use std::collections::HashMap;
use std::sync::Arc;

use rdkafka::error::KafkaError;
use tracing::{info, warn};

use crate::broker::{Publisher, WatermarkSource};
use crate::config::Config;
use crate::consumer::controller::ConsumerTopicController;
use crate::consumer::topic_state::TopicStateMap;
use crate::producer::publish::{publish_with_guarantee, PublishOptions, PublishReport};
use crate::producer::request::PublishRequest;

pub use committer::KafkaOffsetCommitter;
pub use context::PipelineConsumerContext;
pub use membership::{KafkaGroupMembership, SharedMember};
pub use publisher::{DeliveryContext, KafkaPublisher};
pub use watermark::KafkaWatermarkSource;

/// A consumer controller for `topic_states` whose commits go through the
/// group member it manages.
pub fn consumer_controller(
    config: &Config,
    topic_states: TopicStateMap,
) -> ConsumerTopicController {
    let membership = KafkaGroupMembership::from_config(config);
    let committer = Arc::new(membership.committer());
    ConsumerTopicController::new(
        config.consumer_name.clone(),
        topic_states,
        committer,
        Box::new(membership),
    )
}

pub fn watermark_source(config: &Config) -> Result<KafkaWatermarkSource, KafkaError> {
    KafkaWatermarkSource::from_config(
        &config.kafka,
        &format!("{}-watermarks", config.consumer.kafka_consumer_group),
        config.watermark_timeout(),
        config.metadata_timeout(),
    )
}

/// Publishes batches with the configured guarantee and keeps, per topic, the
/// offset the next batch's watermark checks count from.
pub struct PublishClient {
    publisher: Arc<dyn Publisher>,
    watermarks: Arc<dyn WatermarkSource>,
    options: PublishOptions,
    tracked_offsets: HashMap<String, i64>,
}

impl PublishClient {
    pub fn new(
        publisher: Arc<dyn Publisher>,
        watermarks: Arc<dyn WatermarkSource>,
        options: PublishOptions,
    ) -> Self {
        Self {
            publisher,
            watermarks,
            options,
            tracked_offsets: HashMap::new(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, KafkaError> {
        let publisher = KafkaPublisher::from_config(&config.kafka)?;
        let watermarks = watermark_source(config)?;
        Ok(Self::new(
            Arc::new(publisher),
            Arc::new(watermarks),
            config.publish_options(),
        ))
    }

    pub async fn publish(&mut self, requests: Vec<PublishRequest>) -> PublishReport {
        for request in &requests {
            self.track_topic(request.topic());
        }
        publish_with_guarantee(
            self.publisher.as_ref(),
            Arc::clone(&self.watermarks),
            requests,
            &mut self.tracked_offsets,
            &self.options,
        )
        .await
    }

    pub fn tracked_offset(&self, topic: &str) -> Option<i64> {
        self.tracked_offsets.get(topic).copied()
    }

    /// Seeds the tracked offset of a topic seen for the first time with its
    /// current watermark total.
    fn track_topic(&mut self, topic: &str) {
        if self.tracked_offsets.contains_key(topic) {
            return;
        }
        match self.watermarks.published_message_count(topic, 0) {
            Ok(total) => {
                info!(topic = topic, offset = total, "Tracking topic");
                self.tracked_offsets.insert(topic.to_string(), total);
            }
            Err(e) if e.is_missing_metadata() => {
                // not created yet, it starts empty
                self.tracked_offsets.insert(topic.to_string(), 0);
            }
            Err(e) => {
                warn!(topic = topic, error = ?e, "Could not seed tracked offset");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::producer::outcome::PublishResponse;
    use crate::test_utils::{FakeWatermarkSource, ScriptedPublisher, WatermarkReply};

    #[tokio::test]
    async fn test_publish_client_seeds_and_advances_tracked_offsets() {
        let publisher = Arc::new(ScriptedPublisher::new(vec![vec![
            PublishResponse::success("events", 0, 40),
        ]]));
        let watermarks = Arc::new(
            FakeWatermarkSource::new()
                .with_count("events", 40)
                .with_reply("fresh", WatermarkReply::UnknownTopic),
        );
        let mut client = PublishClient::new(publisher, watermarks, PublishOptions::default());

        let report = client
            .publish(vec![PublishRequest::new("events", 0, vec![b"a".to_vec(), b"b".to_vec()])])
            .await;

        assert!(report.is_complete());
        assert_eq!(client.tracked_offset("events"), Some(42));

        client.track_topic("fresh");
        assert_eq!(client.tracked_offset("fresh"), Some(0));
    }
}
