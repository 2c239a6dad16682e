use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info};

use crate::broker::WatermarkSource;
use crate::metrics_consts::{
    HIDDEN_SUCCESS_COUNTER, PUBLISHED_MESSAGES_COUNTER, PUBLISH_RESPONSES_COUNTER,
    RETRIED_REQUESTS_COUNTER, UNVERIFIABLE_REQUESTS_COUNTER,
};
use crate::producer::guarantee::{AmbiguousOutcomePolicy, PublishGuarantee};
use crate::producer::outcome::{success_offsets, PublishResponse};
use crate::producer::request::PublishRequest;
use crate::producer::stats::{Stat, StatsTable};
use crate::producer::watermark::{Reconciliation, UnverifiableReason, WatermarkReconciler};
use crate::types::TopicPartition;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// `requests_to_be_sent` is waiting to be published.
    Sending,
    /// Responses are being classified and reconciled.
    Reconciling,
    /// Nothing left to send.
    Done,
}

/// A request dropped without retry because its true outcome could not be
/// determined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnverifiableRequest {
    pub request: PublishRequest,
    pub reason: UnverifiableReason,
}

/// Decides after every publish round what must be sent again.
///
/// A handler belongs to one batch. It is driven as:
///
/// ```text
/// loop {
///     responses = publish(handler.requests_to_be_sent())
///     handler.update_unpublished_requests(responses, tracked_offsets)
///     if handler.state() == Done || rounds exhausted { break }
/// }
/// ```
///
/// The handler never bounds the number of rounds itself; see
/// [`crate::producer::publish::publish_with_guarantee`].
pub struct RetryHandler {
    initial_requests: Vec<PublishRequest>,
    requests_to_be_sent: Vec<PublishRequest>,
    guarantee: PublishGuarantee,
    ambiguous_policy: AmbiguousOutcomePolicy,
    watermarks: Arc<dyn WatermarkSource>,
    success_stats_this_round: StatsTable,
    success_stats: StatsTable,
    unverifiable: Vec<UnverifiableRequest>,
    state: RetryState,
}

impl RetryHandler {
    pub fn new(
        requests: Vec<PublishRequest>,
        guarantee: PublishGuarantee,
        watermarks: Arc<dyn WatermarkSource>,
    ) -> Self {
        let state = if requests.is_empty() {
            RetryState::Done
        } else {
            RetryState::Sending
        };
        Self {
            initial_requests: requests.clone(),
            requests_to_be_sent: requests,
            guarantee,
            ambiguous_policy: AmbiguousOutcomePolicy::default(),
            watermarks,
            success_stats_this_round: StatsTable::new(),
            success_stats: StatsTable::new(),
            unverifiable: Vec::new(),
            state,
        }
    }

    pub fn with_ambiguous_policy(mut self, policy: AmbiguousOutcomePolicy) -> Self {
        self.ambiguous_policy = policy;
        self
    }

    /// Recomputes the retry set from the responses to the current one.
    ///
    /// `tracked_offsets` holds each topic's offset at round start and is only
    /// read under exactly-once. Broker-level failures never surface as errors
    /// here; every disputed request ends up retried, confirmed or unverifiable.
    pub fn update_unpublished_requests(
        &mut self,
        responses: &[PublishResponse],
        tracked_offsets: &HashMap<String, i64>,
    ) {
        self.state = RetryState::Reconciling;
        self.success_stats_this_round.clear();
        self.unverifiable.clear();

        for response in responses {
            metrics::counter!(PUBLISH_RESPONSES_COUNTER, "outcome" => response.outcome().label())
                .increment(1);
        }

        let successes = success_offsets(responses);
        let mut disputed = Vec::new();

        for request in std::mem::take(&mut self.requests_to_be_sent) {
            match successes.get(request.topic_partition()) {
                Some(&offset) => {
                    let stat = Stat::new(offset, request.message_count());
                    self.record_success(request.topic_partition().clone(), stat);
                    metrics::counter!(PUBLISHED_MESSAGES_COUNTER, "via" => "ack")
                        .increment(stat.message_count as u64);
                }
                None => disputed.push(request),
            }
        }

        let retry = match self.guarantee {
            PublishGuarantee::AtLeastOnce => disputed,
            PublishGuarantee::ExactlyOnce => self.reconcile(disputed, tracked_offsets),
        };

        metrics::counter!(RETRIED_REQUESTS_COUNTER).increment(retry.len() as u64);
        debug!(
            confirmed = self.success_stats_this_round.len(),
            retrying = retry.len(),
            unverifiable = self.unverifiable.len(),
            "Publish round reconciled"
        );

        self.requests_to_be_sent = retry;
        self.state = if self.requests_to_be_sent.is_empty() {
            RetryState::Done
        } else {
            RetryState::Sending
        };
    }

    fn reconcile(
        &mut self,
        disputed: Vec<PublishRequest>,
        tracked_offsets: &HashMap<String, i64>,
    ) -> Vec<PublishRequest> {
        let watermarks = Arc::clone(&self.watermarks);
        let reconciler = WatermarkReconciler::new(watermarks.as_ref(), self.ambiguous_policy);
        let mut retry = Vec::new();

        for request in disputed {
            let tracked = tracked_offsets.get(request.topic()).copied();
            match reconciler.reconcile(&request, tracked) {
                Reconciliation::HiddenSuccess(stat) => {
                    self.record_success(request.topic_partition().clone(), stat);
                    metrics::counter!(HIDDEN_SUCCESS_COUNTER).increment(1);
                    metrics::counter!(PUBLISHED_MESSAGES_COUNTER, "via" => "watermark")
                        .increment(stat.message_count as u64);
                }
                Reconciliation::Retry => retry.push(request),
                Reconciliation::Unverifiable(reason) => {
                    info!(
                        topic = request.topic(),
                        partition = request.partition(),
                        reason = reason.as_str(),
                        "Dropping request with unverifiable outcome"
                    );
                    metrics::counter!(UNVERIFIABLE_REQUESTS_COUNTER, "reason" => reason.as_str())
                        .increment(1);
                    self.unverifiable.push(UnverifiableRequest { request, reason });
                }
            }
        }

        retry
    }

    fn record_success(&mut self, key: TopicPartition, stat: Stat) {
        self.success_stats_this_round.merge(key.clone(), stat);
        self.success_stats.merge(key, stat);
    }

    pub fn requests_to_be_sent(&self) -> &[PublishRequest] {
        &self.requests_to_be_sent
    }

    pub fn initial_requests(&self) -> &[PublishRequest] {
        &self.initial_requests
    }

    pub fn total_published_message_count(&self) -> i64 {
        self.success_stats.total_message_count()
    }

    /// False once every partition targeted by the initial batch has some
    /// recorded success. This does not check that every request landed, so
    /// callers must still bound their retry loop.
    pub fn has_unpublished_request(&self) -> bool {
        let targeted: HashSet<&TopicPartition> = self
            .initial_requests
            .iter()
            .map(PublishRequest::topic_partition)
            .collect();
        !targeted.iter().all(|key| self.success_stats.contains(key))
    }

    pub fn success_stats(&self) -> &StatsTable {
        &self.success_stats
    }

    pub fn success_stats_this_round(&self) -> &StatsTable {
        &self.success_stats_this_round
    }

    /// Requests dropped as unverifiable in the latest round.
    pub fn unverifiable_requests(&self) -> &[UnverifiableRequest] {
        &self.unverifiable
    }

    pub fn state(&self) -> RetryState {
        self.state
    }

    pub fn guarantee(&self) -> PublishGuarantee {
        self.guarantee
    }
}
