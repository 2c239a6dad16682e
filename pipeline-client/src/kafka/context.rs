use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rdkafka::consumer::{BaseConsumer, Consumer, ConsumerContext, Rebalance};
use rdkafka::error::KafkaResult;
use rdkafka::{ClientContext, TopicPartitionList};
use tracing::{debug, error, info, warn};

use crate::consumer::rebalance::RebalanceCoordinator;
use crate::types::{group_by_topic, TopicAssignment, TopicPartition};

/// Forwards librdkafka rebalance callbacks to the [`RebalanceCoordinator`].
///
/// Both callbacks run on the polling thread, inside `poll`, so no message is
/// handed out while the tracked state is being rebuilt.
pub struct PipelineConsumerContext {
    coordinator: Arc<RebalanceCoordinator>,
    assignments: AtomicUsize,
}

impl PipelineConsumerContext {
    pub fn new(coordinator: Arc<RebalanceCoordinator>) -> Self {
        Self {
            coordinator,
            assignments: AtomicUsize::new(0),
        }
    }

    /// Number of assignments this member has received so far.
    pub fn assignments(&self) -> usize {
        self.assignments.load(Ordering::SeqCst)
    }
}

impl ClientContext for PipelineConsumerContext {}

impl ConsumerContext for PipelineConsumerContext {
    fn pre_rebalance(&self, _base_consumer: &BaseConsumer<Self>, rebalance: &Rebalance) {
        match rebalance {
            Rebalance::Revoke(partitions) => {
                info!("Revoking {} partitions", partitions.count());
                self.coordinator.pre_rebalance(&assignment_of(partitions));
            }
            Rebalance::Assign(partitions) => {
                debug!(
                    "Pre-rebalance assign event for {} partitions",
                    partitions.count()
                );
            }
            Rebalance::Error(e) => {
                error!("Rebalance error: {}", e);
            }
        }
    }

    fn post_rebalance(&self, base_consumer: &BaseConsumer<Self>, rebalance: &Rebalance) {
        if let Rebalance::Assign(partitions) = rebalance {
            // the coordinator wants the whole assignment, not the delta
            let assigned = match base_consumer.assignment() {
                Ok(current) if current.count() >= partitions.count() => assignment_of(&current),
                Ok(_) => assignment_of(partitions),
                Err(e) => {
                    warn!("Failed to read current assignment, using rebalance list: {}", e);
                    assignment_of(partitions)
                }
            };
            self.coordinator.post_rebalance(&assigned);
            self.assignments.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn commit_callback(&self, result: KafkaResult<()>, offsets: &TopicPartitionList) {
        match result {
            Ok(()) => debug!("Committed offsets for {} partitions", offsets.count()),
            Err(e) => warn!("Offset commit callback reported failure: {}", e),
        }
    }
}

pub fn assignment_of(partitions: &TopicPartitionList) -> TopicAssignment {
    group_by_topic(partitions.elements().into_iter().map(TopicPartition::from))
}
