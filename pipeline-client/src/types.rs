use std::collections::BTreeMap;
use std::fmt;

use rdkafka::topic_partition_list::TopicPartitionListElem;

/// topic -> partition -> offset
pub type TopicPartitionOffsets = BTreeMap<String, BTreeMap<i32, i64>>;

/// topic -> partitions, as delivered by the group coordinator
pub type TopicAssignment = BTreeMap<String, Vec<i32>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopicPartition {
    topic: String,
    partition: i32,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.topic, self.partition)
    }
}

impl From<TopicPartitionListElem<'_>> for TopicPartition {
    fn from(elem: TopicPartitionListElem<'_>) -> Self {
        Self::new(elem.topic(), elem.partition())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionOffset {
    partition: TopicPartition,
    offset: i64,
}

impl PartitionOffset {
    pub fn new(partition: TopicPartition, offset: i64) -> Self {
        Self { partition, offset }
    }

    pub fn topic(&self) -> &str {
        self.partition.topic()
    }

    pub fn partition_number(&self) -> i32 {
        self.partition.partition()
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }
}

/// Flattens a nested offsets map into commit triples, ordered by topic then partition.
pub fn flatten_offsets(offsets: &TopicPartitionOffsets) -> Vec<PartitionOffset> {
    offsets
        .iter()
        .flat_map(|(topic, partitions)| {
            partitions.iter().map(move |(partition, offset)| {
                PartitionOffset::new(TopicPartition::new(topic.as_str(), *partition), *offset)
            })
        })
        .collect()
}

/// Groups a flat list of partitions into a topic assignment. Partitions are
/// sorted and deduplicated so two snapshots of the same assignment compare equal.
pub fn group_by_topic<I>(partitions: I) -> TopicAssignment
where
    I: IntoIterator<Item = TopicPartition>,
{
    let mut assignment = TopicAssignment::new();
    for tp in partitions {
        assignment
            .entry(tp.topic)
            .or_insert_with(Vec::new)
            .push(tp.partition);
    }
    for partitions in assignment.values_mut() {
        partitions.sort_unstable();
        partitions.dedup();
    }
    assignment
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_offsets_is_ordered() {
        let mut offsets = TopicPartitionOffsets::new();
        offsets.entry("b".to_string()).or_default().insert(1, 20);
        offsets.entry("a".to_string()).or_default().insert(3, 7);
        offsets.entry("a".to_string()).or_default().insert(0, 5);

        let flat = flatten_offsets(&offsets);

        assert_eq!(
            flat,
            vec![
                PartitionOffset::new(TopicPartition::new("a", 0), 5),
                PartitionOffset::new(TopicPartition::new("a", 3), 7),
                PartitionOffset::new(TopicPartition::new("b", 1), 20),
            ]
        );
    }

    #[test]
    fn test_group_by_topic_sorts_and_dedups() {
        let assignment = group_by_topic(vec![
            TopicPartition::new("events", 2),
            TopicPartition::new("events", 0),
            TopicPartition::new("events", 2),
            TopicPartition::new("logs", 1),
        ]);

        assert_eq!(assignment.get("events"), Some(&vec![0, 2]));
        assert_eq!(assignment.get("logs"), Some(&vec![1]));
    }

    #[test]
    fn test_display() {
        assert_eq!(TopicPartition::new("events", 3).to_string(), "events:3");
    }
}
