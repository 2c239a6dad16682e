//! Rebalance bookkeeping for the consumer.
//!
//! The group-coordination layer calls [`RebalanceCoordinator::pre_rebalance`]
//! before partitions are taken away and [`RebalanceCoordinator::post_rebalance`]
//! once the new assignment is known. No message is delivered between the two.
//! A single logical rebalance may produce several `pre_rebalance` calls before
//! the `post_rebalance` one.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tracing::info;

use crate::consumer::topic_state::TrackedTopics;
use crate::metrics_consts::{ASSIGNED_PARTITIONS_GAUGE, REBALANCE_EVENTS_COUNTER};
use crate::types::TopicAssignment;

/// User hooks around a rebalance.
///
/// Both methods receive a full assignment snapshot and may be called more than
/// once for the same rebalance. Implementations must be idempotent: treat them
/// as a function of the snapshot, never of what changed since the last call.
pub trait RebalanceListener: Send + Sync {
    /// Called with the partitions about to be revoked.
    fn on_pre_rebalance(&self, _revoked: &TopicAssignment) {}

    /// Called with the complete new assignment, after internal state was rebuilt.
    fn on_post_rebalance(&self, _assigned: &TopicAssignment) {}
}

pub struct RebalanceCoordinator {
    consumer_name: String,
    state: Mutex<TrackedTopics>,
    listener: RwLock<Option<Arc<dyn RebalanceListener>>>,
    in_rebalance: AtomicBool,
    rebalance_count: AtomicUsize,
}

impl RebalanceCoordinator {
    pub fn new(consumer_name: impl Into<String>, tracked: TrackedTopics) -> Self {
        Self {
            consumer_name: consumer_name.into(),
            state: Mutex::new(tracked),
            listener: RwLock::new(None),
            in_rebalance: AtomicBool::new(false),
            rebalance_count: AtomicUsize::new(0),
        }
    }

    pub fn set_listener(&self, listener: Arc<dyn RebalanceListener>) {
        *self
            .listener
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(listener);
    }

    fn listener(&self) -> Option<Arc<dyn RebalanceListener>> {
        self.listener
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn pre_rebalance(&self, revoked: &TopicAssignment) {
        self.in_rebalance.store(true, Ordering::SeqCst);
        metrics::counter!(REBALANCE_EVENTS_COUNTER, "phase" => "pre").increment(1);
        info!(
            consumer = %self.consumer_name,
            topics = revoked.len(),
            "Rebalance started"
        );

        if let Some(listener) = self.listener() {
            listener.on_pre_rebalance(revoked);
        }
    }

    /// Replaces the tracked topic map with `assigned`, resets the offset cache
    /// and then forwards to the listener.
    pub fn post_rebalance(&self, assigned: &TopicAssignment) {
        let partition_count = {
            let mut state = self.state();
            state.apply_assignment(assigned);
            state.assigned_partition_count()
        };

        self.in_rebalance.store(false, Ordering::SeqCst);
        self.rebalance_count.fetch_add(1, Ordering::SeqCst);
        metrics::counter!(REBALANCE_EVENTS_COUNTER, "phase" => "post").increment(1);
        metrics::gauge!(ASSIGNED_PARTITIONS_GAUGE).set(partition_count as f64);
        info!(
            consumer = %self.consumer_name,
            topics = assigned.len(),
            partitions = partition_count,
            "Rebalance finished, offset cache reset"
        );

        if let Some(listener) = self.listener() {
            listener.on_post_rebalance(assigned);
        }
    }

    /// True between a `pre_rebalance` and the following `post_rebalance`.
    pub fn is_rebalancing(&self) -> bool {
        self.in_rebalance.load(Ordering::SeqCst)
    }

    /// Number of completed rebalances.
    pub fn rebalance_count(&self) -> usize {
        self.rebalance_count.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> MutexGuard<'_, TrackedTopics> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::topic_state::{ConsumerTopicState, TopicStateMap};
    use crate::test_utils::RecordingRebalanceListener;
    use std::collections::BTreeMap;

    fn coordinator() -> RebalanceCoordinator {
        let states = TopicStateMap::from([
            (
                "old".to_string(),
                Some(ConsumerTopicState::new(BTreeMap::from([(0, 1)]), None)),
            ),
            ("pending".to_string(), None),
        ]);
        RebalanceCoordinator::new("test-consumer", TrackedTopics::from_topic_states(&states))
    }

    #[test]
    fn test_post_rebalance_replaces_state_regardless_of_prior() {
        let coordinator = coordinator();
        coordinator
            .state()
            .offset_cache_mut()
            .diff_and_record(&BTreeMap::from([(
                "old".to_string(),
                BTreeMap::from([(0, 1)]),
            )]));

        let assignment = TopicAssignment::from([("events".to_string(), vec![0, 1])]);
        coordinator.pre_rebalance(&TopicAssignment::new());
        assert!(coordinator.is_rebalancing());
        coordinator.post_rebalance(&assignment);

        let state = coordinator.state();
        assert!(state.offset_cache().is_empty());
        assert_eq!(
            state.topic_to_partition_map(),
            &BTreeMap::from([("events".to_string(), Some(vec![0, 1]))])
        );
        assert!(!coordinator.is_rebalancing());
        assert_eq!(coordinator.rebalance_count(), 1);
    }

    #[test]
    fn test_listener_sees_every_call() {
        let coordinator = coordinator();
        let listener = Arc::new(RecordingRebalanceListener::default());
        coordinator.set_listener(listener.clone());

        let revoked = TopicAssignment::from([("old".to_string(), vec![0])]);
        let assigned = TopicAssignment::from([("old".to_string(), vec![0, 1])]);

        // the coordination layer may repeat the pre notification
        coordinator.pre_rebalance(&revoked);
        coordinator.pre_rebalance(&revoked);
        coordinator.post_rebalance(&assigned);

        assert_eq!(listener.pre_calls(), vec![revoked.clone(), revoked]);
        assert_eq!(listener.post_calls(), vec![assigned]);
    }
}
