use crate::types::{TopicPartition, TopicPartitionOffsets};

/// A message handed out by the consumer, detached from the rdkafka buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumedMessage {
    topic_partition: TopicPartition,
    offset: i64,
    schema_id: Option<i64>,
    payload: Option<Vec<u8>>,
}

impl ConsumedMessage {
    pub fn new(
        topic: impl Into<String>,
        partition: i32,
        offset: i64,
        payload: Option<Vec<u8>>,
    ) -> Self {
        Self {
            topic_partition: TopicPartition::new(topic, partition),
            offset,
            schema_id: None,
            payload,
        }
    }

    pub fn with_schema_id(mut self, schema_id: i64) -> Self {
        self.schema_id = Some(schema_id);
        self
    }

    pub fn topic(&self) -> &str {
        self.topic_partition.topic()
    }

    pub fn partition(&self) -> i32 {
        self.topic_partition.partition()
    }

    pub fn topic_partition(&self) -> &TopicPartition {
        &self.topic_partition
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn schema_id(&self) -> Option<i64> {
        self.schema_id
    }

    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }
}

/// Next read position per partition: the highest offset seen plus one.
pub fn next_read_offsets<'a, I>(messages: I) -> TopicPartitionOffsets
where
    I: IntoIterator<Item = &'a ConsumedMessage>,
{
    let mut offsets = TopicPartitionOffsets::new();
    for message in messages {
        let next = message.offset + 1;
        offsets
            .entry(message.topic().to_string())
            .or_default()
            .entry(message.partition())
            .and_modify(|o| *o = (*o).max(next))
            .or_insert(next);
    }
    offsets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_read_offsets_takes_max_plus_one() {
        let messages = vec![
            ConsumedMessage::new("events", 0, 10, None),
            ConsumedMessage::new("events", 0, 12, None),
            ConsumedMessage::new("events", 0, 11, None),
            ConsumedMessage::new("events", 1, 3, None),
            ConsumedMessage::new("logs", 0, 0, None),
        ];

        let offsets = next_read_offsets(&messages);

        assert_eq!(offsets["events"][&0], 13);
        assert_eq!(offsets["events"][&1], 4);
        assert_eq!(offsets["logs"][&0], 1);
    }

    #[test]
    fn test_next_read_offsets_empty() {
        assert!(next_read_offsets(&Vec::<ConsumedMessage>::new()).is_empty());
    }
}
