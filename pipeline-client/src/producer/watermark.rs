//! Exactly-once reconciliation of a request that got no success response.
//!
//! The broker is asked how many messages landed in the topic since the offset
//! tracked at the start of the round. A count equal to the request's size means
//! the request was published and only the acknowledgement was lost.

use tracing::{debug, warn};

use crate::broker::{MetadataError, WatermarkSource};
use crate::producer::guarantee::AmbiguousOutcomePolicy;
use crate::producer::request::PublishRequest;
use crate::producer::stats::Stat;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnverifiableReason {
    /// Topic metadata could not be loaded, so the true state is unknown.
    MetadataUnavailable,
    /// The watermark query itself failed.
    AmbiguousWatermark,
}

impl UnverifiableReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnverifiableReason::MetadataUnavailable => "metadata_unavailable",
            UnverifiableReason::AmbiguousWatermark => "ambiguous_watermark",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Already published; the stat is what the success response would have said.
    HiddenSuccess(Stat),
    /// Send it again next round.
    Retry,
    /// Drop without retrying.
    Unverifiable(UnverifiableReason),
}

pub struct WatermarkReconciler<'a> {
    source: &'a dyn WatermarkSource,
    policy: AmbiguousOutcomePolicy,
}

impl<'a> WatermarkReconciler<'a> {
    pub fn new(source: &'a dyn WatermarkSource, policy: AmbiguousOutcomePolicy) -> Self {
        Self { source, policy }
    }

    /// `tracked_offset` is the topic offset at round start; `None` counts as 0.
    pub fn reconcile(
        &self,
        request: &PublishRequest,
        tracked_offset: Option<i64>,
    ) -> Reconciliation {
        let topic = request.topic();
        let tracked_offset = tracked_offset.unwrap_or(0);

        match self.source.published_message_count(topic, tracked_offset) {
            Ok(count) if count == request.message_count() => {
                debug!(
                    topic = topic,
                    partition = request.partition(),
                    count = count,
                    "Failed request found published by watermark"
                );
                Reconciliation::HiddenSuccess(Stat::new(tracked_offset + count, count))
            }
            Ok(count) => {
                debug!(
                    topic = topic,
                    partition = request.partition(),
                    published = count,
                    expected = request.message_count(),
                    "Watermark count differs from request size, retrying"
                );
                Reconciliation::Retry
            }
            Err(e) if e.is_missing_metadata() => self.reload_metadata(request),
            Err(e) => {
                warn!(
                    topic = topic,
                    partition = request.partition(),
                    policy = %self.policy,
                    error = ?e,
                    "Watermark query failed, publish outcome is ambiguous"
                );
                match self.policy {
                    AmbiguousOutcomePolicy::Drop => {
                        Reconciliation::Unverifiable(UnverifiableReason::AmbiguousWatermark)
                    }
                    AmbiguousOutcomePolicy::Retry => Reconciliation::Retry,
                }
            }
        }
    }

    fn reload_metadata(&self, request: &PublishRequest) -> Reconciliation {
        match self.source.load_topic_metadata(request.topic()) {
            Ok(()) => Reconciliation::Retry,
            Err(MetadataError::LeaderNotAvailable { .. }) => {
                // broker is auto-creating the topic
                Reconciliation::Retry
            }
            Err(e) => {
                warn!(
                    topic = request.topic(),
                    partition = request.partition(),
                    error = ?e,
                    "Could not load topic metadata, dropping request"
                );
                Reconciliation::Unverifiable(UnverifiableReason::MetadataUnavailable)
            }
        }
    }
}
