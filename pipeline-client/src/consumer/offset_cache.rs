use crate::types::TopicPartitionOffsets;

/// Last offset requested for commit per topic partition.
///
/// Entries are written when a commit is requested, not when the broker
/// acknowledges it. The cache is only ever cleared as a whole (on start, stop
/// and every rebalance), which bounds how long an optimistic entry can hide a
/// commit that never reached the broker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffsetCommitCache {
    offsets: TopicPartitionOffsets,
}

impl OffsetCommitCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.offsets.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.values().all(|partitions| partitions.is_empty())
    }

    pub fn get(&self, topic: &str, partition: i32) -> Option<i64> {
        self.offsets
            .get(topic)
            .and_then(|partitions| partitions.get(&partition))
            .copied()
    }

    /// Returns the entries of `offsets` that differ from (or are missing in)
    /// the cache, and records all of them.
    pub fn diff_and_record(&mut self, offsets: &TopicPartitionOffsets) -> TopicPartitionOffsets {
        let mut changed = TopicPartitionOffsets::new();
        for (topic, partitions) in offsets {
            let cached = self.offsets.entry(topic.clone()).or_default();
            for (&partition, &offset) in partitions {
                if cached.get(&partition) != Some(&offset) {
                    cached.insert(partition, offset);
                    changed
                        .entry(topic.clone())
                        .or_default()
                        .insert(partition, offset);
                }
            }
        }
        changed
    }
}
