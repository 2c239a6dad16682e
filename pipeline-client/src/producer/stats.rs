use std::collections::HashMap;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

use crate::types::TopicPartition;

/// Publish progress for one topic partition. Stats form a monoid under
/// component-wise addition with `Stat::default()` as the identity, which is how
/// partial progress from successive retry rounds is merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Stat {
    pub offset: i64,
    pub message_count: i64,
}

impl Stat {
    pub fn new(offset: i64, message_count: i64) -> Self {
        Self {
            offset,
            message_count,
        }
    }
}

impl Add for Stat {
    type Output = Stat;

    fn add(self, other: Stat) -> Stat {
        Stat {
            offset: self.offset + other.offset,
            message_count: self.message_count + other.message_count,
        }
    }
}

impl AddAssign for Stat {
    fn add_assign(&mut self, other: Stat) {
        *self = *self + other;
    }
}

impl Sum for Stat {
    fn sum<I: Iterator<Item = Stat>>(iter: I) -> Stat {
        iter.fold(Stat::default(), Add::add)
    }
}

/// Stats keyed by topic partition. Merging only ever adds, so a table never
/// loses a key once it has one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsTable {
    stats: HashMap<TopicPartition, Stat>,
}

impl StatsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, key: TopicPartition, stat: Stat) {
        *self.stats.entry(key).or_default() += stat;
    }

    pub fn get(&self, key: &TopicPartition) -> Option<Stat> {
        self.stats.get(key).copied()
    }

    pub fn contains(&self, key: &TopicPartition) -> bool {
        self.stats.contains_key(key)
    }

    pub fn total_message_count(&self) -> i64 {
        self.stats.values().map(|s| s.message_count).sum()
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    pub fn clear(&mut self) {
        self.stats.clear();
    }

    /// Message counts summed per topic.
    pub fn message_counts_by_topic(&self) -> HashMap<String, i64> {
        let mut counts = HashMap::new();
        for (key, stat) in &self.stats {
            *counts.entry(key.topic().to_string()).or_insert(0) += stat.message_count;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        let stat = Stat::new(12, 4);
        assert_eq!(stat + Stat::default(), stat);
        assert_eq!(Stat::default() + stat, stat);
    }

    #[test]
    fn test_associative_and_commutative() {
        let a = Stat::new(1, 2);
        let b = Stat::new(10, 3);
        let c = Stat::new(-4, 7);

        assert_eq!((a + b) + c, a + (b + c));
        assert_eq!(a + b, b + a);
        assert_eq!(vec![a, b, c].into_iter().sum::<Stat>(), Stat::new(7, 12));
    }

    #[test]
    fn test_table_merge_accumulates() {
        let mut table = StatsTable::new();
        let key = TopicPartition::new("events", 0);

        table.merge(key.clone(), Stat::new(10, 3));
        table.merge(key.clone(), Stat::new(20, 2));
        table.merge(TopicPartition::new("events", 1), Stat::new(5, 1));
        table.merge(TopicPartition::new("logs", 0), Stat::new(1, 4));

        assert_eq!(table.get(&key), Some(Stat::new(30, 5)));
        assert_eq!(table.len(), 3);
        assert_eq!(table.total_message_count(), 10);

        let by_topic = table.message_counts_by_topic();
        assert_eq!(by_topic.get("events"), Some(&6));
        assert_eq!(by_topic.get("logs"), Some(&4));
    }
}
