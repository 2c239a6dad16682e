//! In-memory stand-ins for the broker and group-coordination collaborators,
//! shared by unit and integration tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::broker::{
    CommitError, GroupMembership, MembershipError, MetadataError, OffsetCommitter, Publisher,
    WatermarkError, WatermarkSource,
};
use crate::consumer::message::ConsumedMessage;
use crate::consumer::rebalance::{RebalanceCoordinator, RebalanceListener};
use crate::consumer::topic_source::{DiscoveryError, TopicDescriptor, TopicDiscovery, TopicFilter};
use crate::producer::outcome::PublishResponse;
use crate::producer::request::PublishRequest;
use crate::types::{PartitionOffset, TopicAssignment};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatermarkReply {
    Count(i64),
    UnknownTopic,
    UnknownPartition,
    QueryFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataReply {
    Loaded,
    LeaderNotAvailable,
    Failed,
}

/// Watermark source with canned per-topic replies. Unknown topics report a
/// count of 0 and load metadata successfully.
#[derive(Default)]
pub struct FakeWatermarkSource {
    replies: HashMap<String, WatermarkReply>,
    metadata: HashMap<String, MetadataReply>,
    queries: Mutex<Vec<(String, i64)>>,
    loads: Mutex<Vec<String>>,
}

impl FakeWatermarkSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_count(self, topic: &str, count: i64) -> Self {
        self.with_reply(topic, WatermarkReply::Count(count))
    }

    pub fn with_reply(mut self, topic: &str, reply: WatermarkReply) -> Self {
        self.replies.insert(topic.to_string(), reply);
        self
    }

    pub fn with_metadata(mut self, topic: &str, reply: MetadataReply) -> Self {
        self.metadata.insert(topic.to_string(), reply);
        self
    }

    /// Tracked offsets the watermark was queried with for `topic`.
    pub fn watermark_queries(&self, topic: &str) -> Vec<i64> {
        self.queries
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, offset)| *offset)
            .collect()
    }

    pub fn metadata_loads(&self) -> Vec<String> {
        self.loads.lock().unwrap().clone()
    }
}

impl WatermarkSource for FakeWatermarkSource {
    fn published_message_count(
        &self,
        topic: &str,
        tracked_offset: i64,
    ) -> Result<i64, WatermarkError> {
        self.queries
            .lock()
            .unwrap()
            .push((topic.to_string(), tracked_offset));
        match self.replies.get(topic).copied().unwrap_or(WatermarkReply::Count(0)) {
            WatermarkReply::Count(count) => Ok(count),
            WatermarkReply::UnknownTopic => Err(WatermarkError::UnknownTopic {
                topic: topic.to_string(),
            }),
            WatermarkReply::UnknownPartition => Err(WatermarkError::UnknownPartition {
                topic: topic.to_string(),
            }),
            WatermarkReply::QueryFailed => Err(WatermarkError::Query {
                topic: topic.to_string(),
                reason: "broker transport failure".to_string(),
            }),
        }
    }

    fn load_topic_metadata(&self, topic: &str) -> Result<(), MetadataError> {
        self.loads.lock().unwrap().push(topic.to_string());
        match self.metadata.get(topic).copied().unwrap_or(MetadataReply::Loaded) {
            MetadataReply::Loaded => Ok(()),
            MetadataReply::LeaderNotAvailable => Err(MetadataError::LeaderNotAvailable {
                topic: topic.to_string(),
            }),
            MetadataReply::Failed => Err(MetadataError::Load {
                topic: topic.to_string(),
                reason: "metadata request failed".to_string(),
            }),
        }
    }
}

/// Publisher that answers each round with the next scripted response list.
/// Once the script runs out every request gets a transport failure.
pub struct ScriptedPublisher {
    script: Mutex<VecDeque<Vec<PublishResponse>>>,
    sent: Mutex<Vec<Vec<PublishRequest>>>,
}

impl ScriptedPublisher {
    pub fn new(rounds: Vec<Vec<PublishResponse>>) -> Self {
        Self {
            script: Mutex::new(rounds.into()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent_rounds(&self) -> Vec<Vec<PublishRequest>> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for ScriptedPublisher {
    async fn publish(&self, requests: &[PublishRequest]) -> Vec<PublishResponse> {
        self.sent.lock().unwrap().push(requests.to_vec());
        match self.script.lock().unwrap().pop_front() {
            Some(responses) => responses,
            None => requests
                .iter()
                .map(|r| PublishResponse::transport_failure(r.topic(), r.partition(), "timed out"))
                .collect(),
        }
    }
}

/// Committer that records every commit call.
#[derive(Default)]
pub struct RecordingCommitter {
    commits: Mutex<Vec<(String, Vec<PartitionOffset>)>>,
    closes: AtomicUsize,
    fail: bool,
}

impl RecordingCommitter {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn commit_calls(&self) -> usize {
        self.commits.lock().unwrap().len()
    }

    /// All committed (topic, partition, offset) triples in call order.
    pub fn committed(&self) -> Vec<(String, i32, i64)> {
        self.commits
            .lock()
            .unwrap()
            .iter()
            .flat_map(|(_, offsets)| offsets.iter())
            .map(|o| (o.topic().to_string(), o.partition_number(), o.offset()))
            .collect()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl OffsetCommitter for RecordingCommitter {
    fn commit_offsets(&self, group: &str, offsets: &[PartitionOffset]) -> Result<(), CommitError> {
        self.commits
            .lock()
            .unwrap()
            .push((group.to_string(), offsets.to_vec()));
        if self.fail {
            return Err(CommitError::Rejected {
                group: group.to_string(),
                reason: "coordinator unavailable".to_string(),
            });
        }
        Ok(())
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct MembershipState {
    cluster: TopicAssignment,
    messages: VecDeque<ConsumedMessage>,
    coordinator: Option<Arc<RebalanceCoordinator>>,
    starts: Vec<Vec<String>>,
    stops: usize,
    fail_start: bool,
    fail_stop: bool,
}

/// Group member over an in-memory cluster. Starting assigns every partition
/// of the subscribed topics that exist in the cluster. Clones share state, so
/// a test can keep a handle after boxing one into a controller.
#[derive(Clone, Default)]
pub struct FakeMembership {
    state: Arc<Mutex<MembershipState>>,
}

impl FakeMembership {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cluster_topic(self, topic: &str, partitions: Vec<i32>) -> Self {
        self.add_cluster_topic(topic, partitions);
        self
    }

    pub fn add_cluster_topic(&self, topic: &str, partitions: Vec<i32>) {
        self.state
            .lock()
            .unwrap()
            .cluster
            .insert(topic.to_string(), partitions);
    }

    pub fn push_message(&self, message: ConsumedMessage) {
        self.state.lock().unwrap().messages.push_back(message);
    }

    pub fn fail_start(&self, fail: bool) {
        self.state.lock().unwrap().fail_start = fail;
    }

    pub fn fail_stop(&self, fail: bool) {
        self.state.lock().unwrap().fail_stop = fail;
    }

    pub fn starts(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().starts.clone()
    }

    pub fn stops(&self) -> usize {
        self.state.lock().unwrap().stops
    }

    /// Delivers a rebalance to the running member's coordinator.
    pub fn trigger_rebalance(&self, revoked: &TopicAssignment, assigned: &TopicAssignment) {
        let coordinator = self.state.lock().unwrap().coordinator.clone();
        if let Some(coordinator) = coordinator {
            coordinator.pre_rebalance(revoked);
            coordinator.post_rebalance(assigned);
        }
    }
}

impl GroupMembership for FakeMembership {
    fn start(
        &mut self,
        topics: &[String],
        coordinator: Arc<RebalanceCoordinator>,
    ) -> Result<(), MembershipError> {
        let assigned: TopicAssignment = {
            let mut state = self.state.lock().unwrap();
            state.starts.push(topics.to_vec());
            if state.fail_start {
                return Err(MembershipError::Other("failed to join group".to_string()));
            }
            state.coordinator = Some(Arc::clone(&coordinator));
            topics
                .iter()
                .filter_map(|t| state.cluster.get(t).map(|p| (t.clone(), p.clone())))
                .collect()
        };
        coordinator.pre_rebalance(&TopicAssignment::new());
        coordinator.post_rebalance(&assigned);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), MembershipError> {
        let mut state = self.state.lock().unwrap();
        state.stops += 1;
        state.coordinator = None;
        if state.fail_stop {
            return Err(MembershipError::Other("failed to leave group".to_string()));
        }
        Ok(())
    }

    fn poll(&mut self, _timeout: Duration) -> Result<Option<ConsumedMessage>, MembershipError> {
        Ok(self.state.lock().unwrap().messages.pop_front())
    }
}

#[derive(Default)]
pub struct RecordingRebalanceListener {
    pre: Mutex<Vec<TopicAssignment>>,
    post: Mutex<Vec<TopicAssignment>>,
}

impl RecordingRebalanceListener {
    pub fn pre_calls(&self) -> Vec<TopicAssignment> {
        self.pre.lock().unwrap().clone()
    }

    pub fn post_calls(&self) -> Vec<TopicAssignment> {
        self.post.lock().unwrap().clone()
    }
}

impl RebalanceListener for RecordingRebalanceListener {
    fn on_pre_rebalance(&self, revoked: &TopicAssignment) {
        self.pre.lock().unwrap().push(revoked.clone());
    }

    fn on_post_rebalance(&self, assigned: &TopicAssignment) {
        self.post.lock().unwrap().push(assigned.clone());
    }
}

/// Discovery over a fixed topic catalogue.
pub struct FakeTopicDiscovery {
    topics: Vec<TopicDescriptor>,
}

impl FakeTopicDiscovery {
    pub fn new(topics: Vec<TopicDescriptor>) -> Self {
        Self { topics }
    }
}

impl TopicDiscovery for FakeTopicDiscovery {
    fn topics_by_criteria(
        &self,
        filter: &TopicFilter,
    ) -> Result<Vec<TopicDescriptor>, DiscoveryError> {
        Ok(self
            .topics
            .iter()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect())
    }
}

pub fn topic_descriptor(
    name: &str,
    namespace: &str,
    source: &str,
    created_at: i64,
) -> TopicDescriptor {
    TopicDescriptor {
        name: name.to_string(),
        namespace: namespace.to_string(),
        source: source.to_string(),
        created_at,
    }
}
