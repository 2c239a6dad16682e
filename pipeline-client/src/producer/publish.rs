use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::broker::{Publisher, WatermarkSource};
use crate::metrics_consts::{PUBLISH_ROUNDS_EXHAUSTED_COUNTER, PUBLISH_ROUNDS_HISTOGRAM};
use crate::producer::guarantee::{AmbiguousOutcomePolicy, PublishGuarantee};
use crate::producer::request::PublishRequest;
use crate::producer::retry_handler::{RetryHandler, RetryState, UnverifiableRequest};
use crate::producer::stats::StatsTable;
use crate::types::TopicPartition;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOptions {
    pub guarantee: PublishGuarantee,
    pub ambiguous_policy: AmbiguousOutcomePolicy,
    pub max_rounds: usize,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            guarantee: PublishGuarantee::default(),
            ambiguous_policy: AmbiguousOutcomePolicy::default(),
            max_rounds: 5,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PublishReport {
    pub rounds: usize,
    pub published_message_count: i64,
    pub stats: StatsTable,
    /// Partitions of requests still waiting for a retry when the rounds ran out.
    pub unpublished: Vec<TopicPartition>,
    /// Requests dropped as unverifiable, across all rounds.
    pub unverifiable: Vec<UnverifiableRequest>,
}

impl PublishReport {
    pub fn is_complete(&self) -> bool {
        self.unpublished.is_empty() && self.unverifiable.is_empty()
    }
}

/// Publishes `requests` with the requested guarantee, retrying for at most
/// `options.max_rounds` rounds.
///
/// `tracked_offsets` maps each topic to its offset before this batch. It is
/// advanced by the messages confirmed in every round so the next round's
/// watermark check counts from the right place.
pub async fn publish_with_guarantee(
    publisher: &dyn Publisher,
    watermarks: Arc<dyn WatermarkSource>,
    requests: Vec<PublishRequest>,
    tracked_offsets: &mut HashMap<String, i64>,
    options: &PublishOptions,
) -> PublishReport {
    let mut handler = RetryHandler::new(requests, options.guarantee, watermarks)
        .with_ambiguous_policy(options.ambiguous_policy);
    let mut report = PublishReport::default();

    while handler.state() == RetryState::Sending && report.rounds < options.max_rounds {
        report.rounds += 1;

        let responses = publisher.publish(handler.requests_to_be_sent()).await;
        handler.update_unpublished_requests(&responses, tracked_offsets);

        for (topic, count) in handler.success_stats_this_round().message_counts_by_topic() {
            *tracked_offsets.entry(topic).or_insert(0) += count;
        }
        report
            .unverifiable
            .extend(handler.unverifiable_requests().iter().cloned());
    }

    metrics::histogram!(PUBLISH_ROUNDS_HISTOGRAM).record(report.rounds as f64);

    report.unpublished = handler
        .requests_to_be_sent()
        .iter()
        .map(|r| r.topic_partition().clone())
        .collect();
    report.published_message_count = handler.total_published_message_count();
    report.stats = handler.success_stats().clone();

    if !report.unpublished.is_empty() {
        metrics::counter!(PUBLISH_ROUNDS_EXHAUSTED_COUNTER).increment(1);
        warn!(
            rounds = report.rounds,
            unpublished = report.unpublished.len(),
            "Publish rounds exhausted with requests still pending"
        );
    } else {
        info!(
            rounds = report.rounds,
            published = report.published_message_count,
            unverifiable = report.unverifiable.len(),
            guarantee = %options.guarantee,
            "Batch published"
        );
    }

    report
}
