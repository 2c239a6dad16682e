use serde::Serialize;

use crate::types::TopicPartition;

/// A batch of messages bound for one topic partition. Requests are immutable
/// once handed to a retry round; a retry resends the same request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    topic_partition: TopicPartition,
    messages: Vec<Vec<u8>>,
}

impl PublishRequest {
    pub fn new(topic: impl Into<String>, partition: i32, messages: Vec<Vec<u8>>) -> Self {
        Self {
            topic_partition: TopicPartition::new(topic, partition),
            messages,
        }
    }

    /// Builds a request whose payloads are the JSON encoding of `items`.
    pub fn from_json<T, I>(
        topic: impl Into<String>,
        partition: i32,
        items: I,
    ) -> Result<Self, serde_json::Error>
    where
        T: Serialize,
        I: IntoIterator<Item = T>,
    {
        let messages = items
            .into_iter()
            .map(|item| serde_json::to_vec(&item))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(topic, partition, messages))
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

    pub fn messages(&self) -> &[Vec<u8>] {
        &self.messages
    }

    pub fn message_count(&self) -> i64 {
        self.messages.len() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Event {
        id: u32,
    }

    #[test]
    fn test_from_json() {
        let request =
            PublishRequest::from_json("events", 2, vec![Event { id: 1 }, Event { id: 2 }])
                .unwrap();

        assert_eq!(request.topic(), "events");
        assert_eq!(request.partition(), 2);
        assert_eq!(request.message_count(), 2);
        assert_eq!(request.messages()[0], br#"{"id":1}"#.to_vec());
    }
}
