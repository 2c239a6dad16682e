use std::collections::BTreeMap;

use crate::consumer::message::ConsumedMessage;
use crate::consumer::offset_cache::OffsetCommitCache;
use crate::types::{TopicAssignment, TopicPartitionOffsets};

/// Read progress for one topic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerTopicState {
    /// partition -> next offset to read
    pub partition_offset_map: BTreeMap<i32, i64>,
    pub last_seen_schema_id: Option<i64>,
}

impl ConsumerTopicState {
    pub fn new(partition_offset_map: BTreeMap<i32, i64>, last_seen_schema_id: Option<i64>) -> Self {
        Self {
            partition_offset_map,
            last_seen_schema_id,
        }
    }

    pub fn update(&mut self, message: &ConsumedMessage) {
        self.partition_offset_map
            .insert(message.partition(), message.offset() + 1);
        if let Some(schema_id) = message.schema_id() {
            self.last_seen_schema_id = Some(schema_id);
        }
    }
}

/// Topics to consume, each with an optional starting state. A `None` state
/// means "resume from the group's committed offsets".
pub type TopicStateMap = BTreeMap<String, Option<ConsumerTopicState>>;

/// Offsets to commit before consuming from `states`.
pub fn starting_offsets(states: &TopicStateMap) -> TopicPartitionOffsets {
    states
        .iter()
        .filter_map(|(topic, state)| {
            state
                .as_ref()
                .map(|s| (topic.clone(), s.partition_offset_map.clone()))
        })
        .collect()
}

/// Everything the consumer knows about the topics it tails. Shared between the
/// controller and the rebalance callbacks, which run on the rdkafka thread.
#[derive(Debug, Default)]
pub struct TrackedTopics {
    /// topic -> assigned partitions, `None` until the first assignment
    topic_to_partition_map: BTreeMap<String, Option<Vec<i32>>>,
    topic_states: BTreeMap<String, ConsumerTopicState>,
    offset_cache: OffsetCommitCache,
}

impl TrackedTopics {
    pub fn from_topic_states(states: &TopicStateMap) -> Self {
        let mut tracked = Self::default();
        tracked.set_topic_states(states);
        tracked
    }

    /// Replaces the topic set. Topics with a state start out with that state's
    /// partitions; the others are unknown until assigned.
    pub fn set_topic_states(&mut self, states: &TopicStateMap) {
        self.topic_to_partition_map = states
            .iter()
            .map(|(topic, state)| {
                (
                    topic.clone(),
                    state
                        .as_ref()
                        .map(|s| s.partition_offset_map.keys().copied().collect()),
                )
            })
            .collect();
        self.topic_states = states
            .iter()
            .filter_map(|(topic, state)| state.clone().map(|s| (topic.clone(), s)))
            .collect();
    }

    pub fn topic_to_partition_map(&self) -> &BTreeMap<String, Option<Vec<i32>>> {
        &self.topic_to_partition_map
    }

    pub fn topics(&self) -> Vec<String> {
        self.topic_to_partition_map.keys().cloned().collect()
    }

    pub fn contains_topic(&self, topic: &str) -> bool {
        self.topic_to_partition_map.contains_key(topic)
    }

    /// Adds topics with unknown partitions. Already tracked topics are kept as is.
    pub fn extend_topics(&mut self, topics: &[String]) {
        for topic in topics {
            self.topic_to_partition_map
                .entry(topic.clone())
                .or_insert(None);
        }
    }

    /// Forgets topics whose partitions are still unknown. Assigned topics stay.
    pub fn remove_unassigned(&mut self, topics: &[String]) {
        self.topic_to_partition_map
            .retain(|topic, partitions| partitions.is_some() || !topics.contains(topic));
    }

    /// Replaces the topic map with exactly `assignment`, rebuilds the topic
    /// states for the assigned partitions and clears the offset cache.
    pub fn apply_assignment(&mut self, assignment: &TopicAssignment) {
        self.topic_to_partition_map = assignment
            .iter()
            .map(|(topic, partitions)| (topic.clone(), Some(partitions.clone())))
            .collect();

        let previous = std::mem::take(&mut self.topic_states);
        self.topic_states = assignment
            .iter()
            .map(|(topic, partitions)| {
                let state = match previous.get(topic) {
                    Some(old) => ConsumerTopicState::new(
                        old.partition_offset_map
                            .iter()
                            .filter(|(p, _)| partitions.contains(*p))
                            .map(|(p, o)| (*p, *o))
                            .collect(),
                        old.last_seen_schema_id,
                    ),
                    None => ConsumerTopicState::default(),
                };
                (topic.clone(), state)
            })
            .collect();

        self.offset_cache.reset();
    }

    pub fn track(&mut self, message: &ConsumedMessage) {
        self.topic_states
            .entry(message.topic().to_string())
            .or_default()
            .update(message);
    }

    pub fn topic_state(&self, topic: &str) -> Option<&ConsumerTopicState> {
        self.topic_states.get(topic)
    }

    pub fn assigned_partition_count(&self) -> usize {
        self.topic_to_partition_map
            .values()
            .flatten()
            .map(Vec::len)
            .sum()
    }

    pub fn offset_cache(&self) -> &OffsetCommitCache {
        &self.offset_cache
    }

    pub fn offset_cache_mut(&mut self) -> &mut OffsetCommitCache {
        &mut self.offset_cache
    }
}
