use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::broker::{CommitError, GroupMembership, MembershipError, OffsetCommitter};
use crate::consumer::message::{next_read_offsets, ConsumedMessage};
use crate::consumer::rebalance::{RebalanceCoordinator, RebalanceListener};
use crate::consumer::topic_source::{
    ConsumerSource, DiscoveryError, TopicDescriptor, TopicDiscovery, TopicFilter,
};
use crate::consumer::topic_state::{
    starting_offsets, ConsumerTopicState, TopicStateMap, TrackedTopics,
};
use crate::metrics_consts::{
    CONSUMER_RESTARTS_COUNTER, CONSUMER_STOP_ERRORS_COUNTER, OFFSET_COMMITS_COUNTER,
    OFFSET_COMMITS_SUPPRESSED_COUNTER,
};
use crate::types::{flatten_offsets, TopicPartitionOffsets};

#[derive(Error, Debug)]
pub enum ConsumerError {
    #[error("consumer {0} is already running")]
    AlreadyRunning(String),

    #[error("no topic discovery configured for consumer {0}")]
    NoTopicDiscovery(String),

    #[error(transparent)]
    Commit(#[from] CommitError),

    #[error(transparent)]
    Membership(#[from] MembershipError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

/// Called with (currently tailed topics, topics about to be added) before a
/// topic refresh restarts the consumer.
pub type PreTopicRefreshCallback<'a> = &'a dyn Fn(&[String], &[String]);

/// Owns a consumer-group member together with its offset bookkeeping.
///
/// Offsets are committed through a cache that suppresses unchanged values. The
/// cache, like the topic map, is rebuilt on every start, stop and rebalance.
/// Adding topics always renegotiates group membership with a full stop and
/// start.
pub struct ConsumerTopicController {
    consumer_name: String,
    coordinator: Arc<RebalanceCoordinator>,
    committer: Arc<dyn OffsetCommitter>,
    membership: Box<dyn GroupMembership>,
    discovery: Option<Arc<dyn TopicDiscovery>>,
    initial_topic_states: TopicStateMap,
    running: bool,
}

impl ConsumerTopicController {
    pub fn new(
        consumer_name: impl Into<String>,
        topic_states: TopicStateMap,
        committer: Arc<dyn OffsetCommitter>,
        membership: Box<dyn GroupMembership>,
    ) -> Self {
        let consumer_name = consumer_name.into();
        let coordinator = Arc::new(RebalanceCoordinator::new(
            consumer_name.clone(),
            TrackedTopics::from_topic_states(&topic_states),
        ));
        Self {
            consumer_name,
            coordinator,
            committer,
            membership,
            discovery: None,
            initial_topic_states: topic_states,
            running: false,
        }
    }

    pub fn with_rebalance_listener(self, listener: Arc<dyn RebalanceListener>) -> Self {
        self.coordinator.set_listener(listener);
        self
    }

    pub fn with_topic_discovery(mut self, discovery: Arc<dyn TopicDiscovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// Commits the starting offsets of the initial topic states, then joins
    /// the group.
    pub fn start(&mut self) -> Result<(), ConsumerError> {
        info!(consumer = %self.consumer_name, "Committing starting offsets");
        self.reset_offset_cache();
        let offsets = starting_offsets(&self.initial_topic_states);
        self.commit_offsets(&offsets)?;
        self.start_consumer()
    }

    fn start_consumer(&mut self) -> Result<(), ConsumerError> {
        if self.running {
            return Err(ConsumerError::AlreadyRunning(self.consumer_name.clone()));
        }
        let topics = self.topics();
        info!(consumer = %self.consumer_name, topics = ?topics, "Starting consumer");
        self.membership
            .start(&topics, Arc::clone(&self.coordinator))?;
        self.running = true;
        info!(consumer = %self.consumer_name, "Consumer started");
        Ok(())
    }

    /// Leaves the group, closes the broker connection and clears the offset
    /// cache. The connection is closed and the cache cleared even when leaving
    /// the group fails. Stopping a stopped consumer is a no-op apart from that.
    pub fn stop(&mut self) -> Result<(), ConsumerError> {
        info!(consumer = %self.consumer_name, "Stopping consumer");
        let stopped = if self.running {
            self.membership.stop()
        } else {
            Ok(())
        };
        self.committer.close();
        self.reset_offset_cache();
        self.running = false;
        stopped?;
        info!(consumer = %self.consumer_name, "Consumer stopped");
        Ok(())
    }

    /// Starts the consumer, runs `work` and always stops afterwards. An error
    /// from `work` takes priority over an error from stopping, which is then
    /// only logged.
    pub fn run<T, E, F>(&mut self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<ConsumerError>,
    {
        self.start()?;
        let result = work(self);
        match (result, self.stop()) {
            (result, Ok(())) => result,
            (Err(e), Err(stop_error)) => {
                metrics::counter!(CONSUMER_STOP_ERRORS_COUNTER).increment(1);
                error!(
                    consumer = %self.consumer_name,
                    error = ?stop_error,
                    "Failed to stop the consumer"
                );
                Err(e)
            }
            (Ok(_), Err(stop_error)) => {
                metrics::counter!(CONSUMER_STOP_ERRORS_COUNTER).increment(1);
                error!(
                    consumer = %self.consumer_name,
                    error = ?stop_error,
                    "Failed to stop the consumer"
                );
                Err(stop_error.into())
            }
        }
    }

    /// Up to `count` messages, fewer if nothing more arrives within `timeout`.
    pub fn get_messages(
        &mut self,
        count: usize,
        timeout: Duration,
    ) -> Result<Vec<ConsumedMessage>, ConsumerError> {
        if !self.running {
            return Err(MembershipError::NotStarted.into());
        }
        let deadline = Instant::now() + timeout;
        let mut messages = Vec::with_capacity(count);
        while messages.len() < count {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.membership.poll(remaining)? {
                Some(message) => {
                    self.track_message(&message);
                    messages.push(message);
                }
                None => break,
            }
        }
        Ok(messages)
    }

    pub fn get_message(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<ConsumedMessage>, ConsumerError> {
        Ok(self.get_messages(1, timeout)?.into_iter().next())
    }

    /// Updates the topic state for a received message.
    pub fn track_message(&self, message: &ConsumedMessage) {
        self.coordinator.state().track(message);
    }

    pub fn commit_message(&self, message: &ConsumedMessage) -> Result<(), ConsumerError> {
        self.commit_messages(std::slice::from_ref(message))
    }

    /// Commits the position after the highest offset seen per partition.
    pub fn commit_messages(&self, messages: &[ConsumedMessage]) -> Result<(), ConsumerError> {
        self.commit_offsets(&next_read_offsets(messages))
    }

    /// Commits only the offsets that differ from what was last requested. The
    /// cache is updated before the broker answers.
    pub fn commit_offsets(&self, offsets: &TopicPartitionOffsets) -> Result<(), ConsumerError> {
        let changed = self
            .coordinator
            .state()
            .offset_cache_mut()
            .diff_and_record(offsets);

        let requested: usize = offsets.values().map(|p| p.len()).sum();
        let to_commit = flatten_offsets(&changed);
        let suppressed = requested - to_commit.len();
        if suppressed > 0 {
            metrics::counter!(OFFSET_COMMITS_SUPPRESSED_COUNTER).increment(suppressed as u64);
        }

        if to_commit.is_empty() {
            debug!(
                consumer = %self.consumer_name,
                suppressed = suppressed,
                "No offset changes to commit"
            );
            return Ok(());
        }

        match self.committer.commit_offsets(&self.consumer_name, &to_commit) {
            Ok(()) => {
                metrics::counter!(OFFSET_COMMITS_COUNTER, "outcome" => "success").increment(1);
                debug!(
                    consumer = %self.consumer_name,
                    partitions = to_commit.len(),
                    "Committed offsets"
                );
                Ok(())
            }
            Err(e) => {
                metrics::counter!(OFFSET_COMMITS_COUNTER, "outcome" => "failure").increment(1);
                warn!(consumer = %self.consumer_name, error = ?e, "Offset commit failed");
                Err(e.into())
            }
        }
    }

    /// Runs `work` and commits `messages` afterwards whether or not it
    /// succeeded. An error from `work` wins over a commit error.
    pub fn ensure_committed<T, E, F>(&self, messages: &[ConsumedMessage], work: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<ConsumerError>,
    {
        let result = work();
        match (result, self.commit_messages(messages)) {
            (result, Ok(())) => result,
            (Err(e), Err(commit_error)) => {
                warn!(
                    consumer = %self.consumer_name,
                    error = ?commit_error,
                    "Commit after failed work also failed"
                );
                Err(e)
            }
            (Ok(_), Err(commit_error)) => Err(commit_error.into()),
        }
    }

    pub fn reset_offset_cache(&self) {
        self.coordinator.state().offset_cache_mut().reset();
    }

    /// Switches to a new topic set: stop, commit the given starting offsets,
    /// replace the topic map and start again.
    pub fn reset_topics(&mut self, topic_states: TopicStateMap) -> Result<(), ConsumerError> {
        self.stop()?;
        self.commit_offsets(&starting_offsets(&topic_states))?;
        self.coordinator.state().set_topic_states(&topic_states);
        self.initial_topic_states = topic_states;
        self.start_consumer()
    }

    /// Adds the topics of `source` that are not tracked yet and returns the
    /// ones that were actually assigned after the restart. Topics that do not
    /// exist on the broker drop out of the assignment and are not returned.
    pub fn refresh_topics(
        &mut self,
        source: &dyn ConsumerSource,
    ) -> Result<Vec<String>, ConsumerError> {
        let new_topics = self.untracked(source.topics()?);
        if new_topics.is_empty() {
            return Ok(new_topics);
        }

        self.restart_with(&new_topics)?;

        let state = self.coordinator.state();
        Ok(new_topics
            .into_iter()
            .filter(|topic| state.contains_topic(topic))
            .collect())
    }

    /// Discovers topics matching `filter` and starts tailing the new ones.
    /// `pre_refresh` runs before the restart. Returns the new topics.
    pub fn refresh_new_topics(
        &mut self,
        filter: &TopicFilter,
        pre_refresh: Option<PreTopicRefreshCallback<'_>>,
    ) -> Result<Vec<TopicDescriptor>, ConsumerError> {
        let discovery = self
            .discovery
            .clone()
            .ok_or_else(|| ConsumerError::NoTopicDiscovery(self.consumer_name.clone()))?;

        let found = filter.apply_filter_fn(discovery.topics_by_criteria(filter)?);
        let new_topics: Vec<TopicDescriptor> = {
            let state = self.coordinator.state();
            found
                .into_iter()
                .filter(|t| !state.contains_topic(&t.name))
                .collect()
        };

        if !new_topics.is_empty() {
            let new_names: Vec<String> = new_topics.iter().map(|t| t.name.clone()).collect();
            if let Some(callback) = pre_refresh {
                callback(&self.topics(), &new_names);
            }
            self.restart_with(&new_names)?;
        }

        Ok(new_topics)
    }

    fn untracked(&self, topics: Vec<String>) -> Vec<String> {
        let state = self.coordinator.state();
        let mut new_topics: Vec<String> = topics
            .into_iter()
            .filter(|topic| !state.contains_topic(topic))
            .collect();
        new_topics.sort();
        new_topics.dedup();
        new_topics
    }

    fn restart_with(&mut self, new_topics: &[String]) -> Result<(), ConsumerError> {
        info!(
            consumer = %self.consumer_name,
            new_topics = ?new_topics,
            "Restarting consumer to add topics"
        );
        metrics::counter!(CONSUMER_RESTARTS_COUNTER).increment(1);
        self.stop()?;
        self.coordinator.state().extend_topics(new_topics);
        if let Err(e) = self.start_consumer() {
            // untrack them again so the next refresh retries them
            self.coordinator.state().remove_unassigned(new_topics);
            error!(
                consumer = %self.consumer_name,
                new_topics = ?new_topics,
                error = ?e,
                "Restart with new topics failed"
            );
            return Err(e);
        }
        Ok(())
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn topics(&self) -> Vec<String> {
        self.coordinator.state().topics()
    }

    pub fn topic_to_partition_map(&self) -> BTreeMap<String, Option<Vec<i32>>> {
        self.coordinator.state().topic_to_partition_map().clone()
    }

    pub fn topic_state(&self, topic: &str) -> Option<ConsumerTopicState> {
        self.coordinator.state().topic_state(topic).cloned()
    }

    pub fn cached_offset(&self, topic: &str, partition: i32) -> Option<i64> {
        self.coordinator.state().offset_cache().get(topic, partition)
    }

    pub fn coordinator(&self) -> &Arc<RebalanceCoordinator> {
        &self.coordinator
    }
}
