use std::collections::HashMap;

use crate::types::TopicPartition;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// The request never got a broker response (timeout, connection loss,
    /// cancelled delivery).
    Transport(String),
    /// The broker answered with a non-zero error code.
    Broker { code: i32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Success { offset: i64 },
    Failure(FailureKind),
}

impl PublishOutcome {
    /// Classifies a raw produce reply. Only error code 0 counts as success.
    pub fn from_broker_reply(error_code: i32, offset: i64) -> Self {
        if error_code == 0 {
            PublishOutcome::Success { offset }
        } else {
            PublishOutcome::Failure(FailureKind::Broker { code: error_code })
        }
    }

    pub fn transport_failure(reason: impl Into<String>) -> Self {
        PublishOutcome::Failure(FailureKind::Transport(reason.into()))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PublishOutcome::Success { .. })
    }

    pub fn success_offset(&self) -> Option<i64> {
        match self {
            PublishOutcome::Success { offset } => Some(*offset),
            PublishOutcome::Failure(_) => None,
        }
    }

    /// Outcome tag for metrics/logging
    pub fn label(&self) -> &'static str {
        match self {
            PublishOutcome::Success { .. } => "success",
            PublishOutcome::Failure(FailureKind::Transport(_)) => "transport_failure",
            PublishOutcome::Failure(FailureKind::Broker { .. }) => "broker_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishResponse {
    topic_partition: TopicPartition,
    outcome: PublishOutcome,
}

impl PublishResponse {
    pub fn new(topic_partition: TopicPartition, outcome: PublishOutcome) -> Self {
        Self {
            topic_partition,
            outcome,
        }
    }

    pub fn success(topic: impl Into<String>, partition: i32, offset: i64) -> Self {
        Self::new(
            TopicPartition::new(topic, partition),
            PublishOutcome::Success { offset },
        )
    }

    pub fn transport_failure(
        topic: impl Into<String>,
        partition: i32,
        reason: impl Into<String>,
    ) -> Self {
        Self::new(
            TopicPartition::new(topic, partition),
            PublishOutcome::transport_failure(reason),
        )
    }

    pub fn broker_error(topic: impl Into<String>, partition: i32, code: i32) -> Self {
        Self::new(
            TopicPartition::new(topic, partition),
            PublishOutcome::Failure(FailureKind::Broker { code }),
        )
    }

    pub fn topic_partition(&self) -> &TopicPartition {
        &self.topic_partition
    }

    pub fn outcome(&self) -> &PublishOutcome {
        &self.outcome
    }
}

/// Success offsets indexed by topic partition. Failed responses are left out;
/// when one partition has several successes the last one wins.
pub fn success_offsets(responses: &[PublishResponse]) -> HashMap<TopicPartition, i64> {
    responses
        .iter()
        .filter_map(|r| {
            r.outcome
                .success_offset()
                .map(|offset| (r.topic_partition.clone(), offset))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::ok(0, 15, PublishOutcome::Success { offset: 15 })]
    #[case::not_leader(6, 15, PublishOutcome::Failure(FailureKind::Broker { code: 6 }))]
    #[case::request_timed_out(7, -1, PublishOutcome::Failure(FailureKind::Broker { code: 7 }))]
    fn test_from_broker_reply(
        #[case] error_code: i32,
        #[case] offset: i64,
        #[case] expected: PublishOutcome,
    ) {
        assert_eq!(PublishOutcome::from_broker_reply(error_code, offset), expected);
    }

    #[test]
    fn test_success_offsets_skips_failures() {
        let responses = vec![
            PublishResponse::success("events", 0, 10),
            PublishResponse::transport_failure("events", 1, "timed out"),
            PublishResponse::broker_error("events", 2, 5),
            PublishResponse::success("logs", 0, 3),
        ];

        let offsets = success_offsets(&responses);

        assert_eq!(offsets.len(), 2);
        assert_eq!(offsets.get(&TopicPartition::new("events", 0)), Some(&10));
        assert_eq!(offsets.get(&TopicPartition::new("logs", 0)), Some(&3));
    }

    #[test]
    fn test_labels() {
        assert_eq!(PublishOutcome::Success { offset: 0 }.label(), "success");
        assert_eq!(
            PublishOutcome::transport_failure("gone").label(),
            "transport_failure"
        );
        assert_eq!(
            PublishOutcome::from_broker_reply(3, 0).label(),
            "broker_error"
        );
    }
}
