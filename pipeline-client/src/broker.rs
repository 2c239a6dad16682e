//! Boundaries to the broker and group-coordination collaborators.
//!
//! Everything the retry engine and the consumer controller need from Kafka goes
//! through these traits. The rdkafka-backed implementations live in
//! [`crate::kafka`]; tests use the fakes in [`crate::test_utils`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::error::KafkaError;
use thiserror::Error;

use crate::consumer::message::ConsumedMessage;
use crate::consumer::rebalance::RebalanceCoordinator;
use crate::producer::outcome::PublishResponse;
use crate::producer::request::PublishRequest;
use crate::types::PartitionOffset;

#[derive(Error, Debug)]
pub enum WatermarkError {
    #[error("topic {topic} is unknown to the broker")]
    UnknownTopic { topic: String },

    #[error("partitions of topic {topic} are unknown to the broker")]
    UnknownPartition { topic: String },

    #[error("watermark query for topic {topic} failed: {reason}")]
    Query { topic: String, reason: String },
}

impl WatermarkError {
    /// True when the broker did not know the topic or one of its partitions,
    /// which usually means stale client metadata or a topic not created yet.
    pub fn is_missing_metadata(&self) -> bool {
        matches!(
            self,
            WatermarkError::UnknownTopic { .. } | WatermarkError::UnknownPartition { .. }
        )
    }
}

#[derive(Error, Debug)]
pub enum MetadataError {
    /// The broker has no leader for the topic yet, typically because it is
    /// auto-creating it.
    #[error("leader not available for topic {topic}")]
    LeaderNotAvailable { topic: String },

    #[error("metadata load for topic {topic} failed: {reason}")]
    Load { topic: String, reason: String },
}

#[derive(Error, Debug)]
pub enum CommitError {
    #[error("offset commit for group {group} failed: {source}")]
    Kafka {
        group: String,
        #[source]
        source: KafkaError,
    },

    #[error("offset commit for group {group} failed: {reason}")]
    Rejected { group: String, reason: String },
}

#[derive(Error, Debug)]
pub enum MembershipError {
    #[error("kafka error during {operation}: {source}")]
    Kafka {
        operation: &'static str,
        #[source]
        source: KafkaError,
    },

    #[error("group membership is not started")]
    NotStarted,

    #[error("{0}")]
    Other(String),
}

/// Synchronous-per-round publishing. Implementations return at most one
/// response per request; requests with no response are treated as failed.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, requests: &[PublishRequest]) -> Vec<PublishResponse>;
}

/// Broker-side view of what was actually published.
pub trait WatermarkSource: Send + Sync {
    /// Number of messages present in `topic` beyond `tracked_offset`.
    fn published_message_count(&self, topic: &str, tracked_offset: i64)
        -> Result<i64, WatermarkError>;

    /// Refreshes client metadata for `topic`.
    fn load_topic_metadata(&self, topic: &str) -> Result<(), MetadataError>;
}

pub trait OffsetCommitter: Send + Sync {
    fn commit_offsets(&self, group: &str, offsets: &[PartitionOffset]) -> Result<(), CommitError>;

    /// Closes the broker connection. Must be safe to call repeatedly and the
    /// committer must be usable again afterwards.
    fn close(&self);
}

/// The consumer-group member. `start` joins the group for `topics` and routes
/// rebalance notifications to `coordinator`; `stop` leaves the group.
pub trait GroupMembership: Send {
    fn start(
        &mut self,
        topics: &[String],
        coordinator: Arc<RebalanceCoordinator>,
    ) -> Result<(), MembershipError>;

    fn stop(&mut self) -> Result<(), MembershipError>;

    fn poll(&mut self, timeout: Duration) -> Result<Option<ConsumedMessage>, MembershipError>;
}
