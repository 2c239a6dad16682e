use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use mockall::mock;
use pipeline_client::broker::{CommitError, MembershipError, OffsetCommitter};
use pipeline_client::consumer::{
    ConsumedMessage, ConsumerError, ConsumerTopicController, ConsumerTopicState, FixedTopics,
    TopicFilter, TopicStateMap,
};
use pipeline_client::test_utils::{
    topic_descriptor, FakeMembership, FakeTopicDiscovery, RecordingCommitter,
    RecordingRebalanceListener,
};
use pipeline_client::types::{PartitionOffset, TopicAssignment, TopicPartitionOffsets};

mock! {
    pub Committer {}

    impl OffsetCommitter for Committer {
        fn commit_offsets(&self, group: &str, offsets: &[PartitionOffset]) -> Result<(), CommitError>;
        fn close(&self);
    }
}

fn offsets(topic: &str, partition: i32, offset: i64) -> TopicPartitionOffsets {
    BTreeMap::from([(topic.to_string(), BTreeMap::from([(partition, offset)]))])
}

fn events_only() -> TopicStateMap {
    TopicStateMap::from([("events".to_string(), None)])
}

fn controller_with(
    states: TopicStateMap,
    committer: Arc<dyn OffsetCommitter>,
    membership: &FakeMembership,
) -> ConsumerTopicController {
    ConsumerTopicController::new("test-consumer", states, committer, Box::new(membership.clone()))
}

#[derive(Debug)]
enum WorkError {
    Work(&'static str),
    Consumer(ConsumerError),
}

impl From<ConsumerError> for WorkError {
    fn from(e: ConsumerError) -> Self {
        WorkError::Consumer(e)
    }
}

#[test]
fn test_unchanged_offsets_are_committed_once() {
    let mut committer = MockCommitter::new();
    committer
        .expect_commit_offsets()
        .withf(|group, offsets| {
            group == "test-consumer" && offsets.len() == 1 && offsets[0].offset() == 5
        })
        .times(1)
        .returning(|_, _| Ok(()));
    committer
        .expect_commit_offsets()
        .withf(|_, offsets| offsets.len() == 1 && offsets[0].offset() == 6)
        .times(1)
        .returning(|_, _| Ok(()));
    committer.expect_close().return_const(());

    let membership = FakeMembership::new().with_cluster_topic("events", vec![0]);
    let mut controller = controller_with(events_only(), Arc::new(committer), &membership);
    controller.start().unwrap();

    controller.commit_offsets(&offsets("events", 0, 5)).unwrap();
    controller.commit_offsets(&offsets("events", 0, 5)).unwrap();
    controller.commit_offsets(&offsets("events", 0, 6)).unwrap();

    assert_eq!(controller.cached_offset("events", 0), Some(6));
}

#[test]
fn test_rebalance_resets_cache_and_replaces_assignment() {
    let committer = Arc::new(RecordingCommitter::default());
    let membership = FakeMembership::new()
        .with_cluster_topic("events", vec![0, 1, 2])
        .with_cluster_topic("logs", vec![0]);
    let states = TopicStateMap::from([
        ("events".to_string(), None),
        ("logs".to_string(), None),
    ]);
    let mut controller = controller_with(states, committer.clone(), &membership);
    controller.start().unwrap();
    controller.commit_offsets(&offsets("events", 1, 40)).unwrap();
    assert_eq!(controller.cached_offset("events", 1), Some(40));

    let revoked = TopicAssignment::from([
        ("events".to_string(), vec![0, 1, 2]),
        ("logs".to_string(), vec![0]),
    ]);
    let assigned = TopicAssignment::from([("events".to_string(), vec![1])]);
    membership.trigger_rebalance(&revoked, &assigned);

    assert_eq!(controller.cached_offset("events", 1), None);
    assert_eq!(
        controller.topic_to_partition_map(),
        BTreeMap::from([("events".to_string(), Some(vec![1]))])
    );

    // the cache forgot the offset, so the same value goes to the broker again
    controller.commit_offsets(&offsets("events", 1, 40)).unwrap();
    assert_eq!(committer.commit_calls(), 2);
}

#[test]
fn test_rebalance_listener_is_notified() {
    let listener = Arc::new(RecordingRebalanceListener::default());
    let membership = FakeMembership::new().with_cluster_topic("events", vec![0, 1]);
    let mut controller = controller_with(
        events_only(),
        Arc::new(RecordingCommitter::default()),
        &membership,
    )
    .with_rebalance_listener(listener.clone());

    controller.start().unwrap();

    let assigned = TopicAssignment::from([("events".to_string(), vec![0, 1])]);
    assert_eq!(listener.post_calls(), vec![assigned]);
    assert_eq!(listener.pre_calls(), vec![TopicAssignment::new()]);
    assert_eq!(controller.coordinator().rebalance_count(), 1);
}

#[test]
fn test_commit_messages_commits_next_read_position() {
    let committer = Arc::new(RecordingCommitter::default());
    let membership = FakeMembership::new().with_cluster_topic("events", vec![0, 1]);
    let mut controller = controller_with(events_only(), committer.clone(), &membership);
    controller.start().unwrap();

    membership.push_message(ConsumedMessage::new("events", 0, 3, Some(b"a".to_vec())));
    membership.push_message(ConsumedMessage::new("events", 1, 8, Some(b"b".to_vec())));
    membership.push_message(ConsumedMessage::new("events", 0, 4, Some(b"c".to_vec())));

    let messages = controller
        .get_messages(10, Duration::from_millis(10))
        .unwrap();
    controller.commit_messages(&messages).unwrap();

    assert_eq!(
        committer.committed(),
        vec![("events".to_string(), 0, 5), ("events".to_string(), 1, 9)]
    );
}

#[test]
fn test_refresh_topics_returns_only_assigned_new_topics() {
    let membership = FakeMembership::new()
        .with_cluster_topic("events", vec![0])
        .with_cluster_topic("logs", vec![0, 1]);
    let mut controller = controller_with(
        events_only(),
        Arc::new(RecordingCommitter::default()),
        &membership,
    );
    controller.start().unwrap();

    let added = controller
        .refresh_topics(&FixedTopics::new(["logs", "missing", "events"]))
        .unwrap();

    assert_eq!(added, vec!["logs".to_string()]);
    assert!(controller.is_running());
    assert_eq!(membership.stops(), 1);
    assert_eq!(
        membership.starts().last(),
        Some(&vec![
            "events".to_string(),
            "logs".to_string(),
            "missing".to_string()
        ])
    );
    assert_eq!(controller.topics(), vec!["events".to_string(), "logs".to_string()]);
}

#[test]
fn test_refresh_topics_without_new_topics_does_not_restart() {
    let membership = FakeMembership::new().with_cluster_topic("events", vec![0]);
    let mut controller = controller_with(
        events_only(),
        Arc::new(RecordingCommitter::default()),
        &membership,
    );
    controller.start().unwrap();

    let added = controller
        .refresh_topics(&FixedTopics::new(["events"]))
        .unwrap();

    assert!(added.is_empty());
    assert_eq!(membership.starts().len(), 1);
    assert_eq!(membership.stops(), 0);
}

#[test]
fn test_refresh_new_topics_runs_callback_before_restart() {
    let discovery = Arc::new(FakeTopicDiscovery::new(vec![
        topic_descriptor("events", "pipeline", "web", 100),
        topic_descriptor("clicks", "pipeline", "web", 200),
        topic_descriptor("billing", "finance", "web", 300),
    ]));
    let membership = FakeMembership::new()
        .with_cluster_topic("events", vec![0])
        .with_cluster_topic("clicks", vec![0]);
    let mut controller = controller_with(
        events_only(),
        Arc::new(RecordingCommitter::default()),
        &membership,
    )
    .with_topic_discovery(discovery);
    controller.start().unwrap();

    let seen = RefCell::new(Vec::new());
    let callback = |old: &[String], new: &[String]| {
        seen.borrow_mut().push((old.to_vec(), new.to_vec()));
    };

    let added = controller
        .refresh_new_topics(&TopicFilter::for_namespace("pipeline"), Some(&callback))
        .unwrap();

    assert_eq!(added, vec![topic_descriptor("clicks", "pipeline", "web", 200)]);
    assert_eq!(
        seen.into_inner(),
        vec![(vec!["events".to_string()], vec!["clicks".to_string()])]
    );
    assert!(controller.topics().contains(&"clicks".to_string()));
}

#[test]
fn test_refresh_new_topics_requires_discovery() {
    let membership = FakeMembership::new();
    let mut controller = controller_with(
        events_only(),
        Arc::new(RecordingCommitter::default()),
        &membership,
    );

    assert!(matches!(
        controller.refresh_new_topics(&TopicFilter::for_namespace("pipeline"), None),
        Err(ConsumerError::NoTopicDiscovery(_))
    ));
}

#[test]
fn test_reset_topics_commits_new_starting_offsets() {
    let committer = Arc::new(RecordingCommitter::default());
    let membership = FakeMembership::new()
        .with_cluster_topic("events", vec![0])
        .with_cluster_topic("logs", vec![0]);
    let mut controller = controller_with(events_only(), committer.clone(), &membership);
    controller.start().unwrap();

    let states = TopicStateMap::from([(
        "logs".to_string(),
        Some(ConsumerTopicState::new(BTreeMap::from([(0, 12)]), Some(3))),
    )]);
    controller.reset_topics(states).unwrap();

    assert_eq!(committer.committed(), vec![("logs".to_string(), 0, 12)]);
    assert_eq!(controller.topics(), vec!["logs".to_string()]);
    assert_eq!(
        membership.starts().last(),
        Some(&vec!["logs".to_string()])
    );
}

#[test]
fn test_run_prefers_work_error_over_stop_error() {
    let membership = FakeMembership::new();
    membership.fail_stop(true);
    let mut controller = controller_with(
        events_only(),
        Arc::new(RecordingCommitter::default()),
        &membership,
    );

    let result: Result<(), WorkError> = controller.run(|_| Err(WorkError::Work("boom")));

    assert!(matches!(result, Err(WorkError::Work("boom"))));
    assert!(!controller.is_running());
}

#[test]
fn test_run_surfaces_stop_error_after_successful_work() {
    let membership = FakeMembership::new();
    membership.fail_stop(true);
    let mut controller = controller_with(
        events_only(),
        Arc::new(RecordingCommitter::default()),
        &membership,
    );

    let result: Result<usize, WorkError> = controller.run(|c| Ok(c.topics().len()));

    assert!(matches!(
        result,
        Err(WorkError::Consumer(ConsumerError::Membership(
            MembershipError::Other(_)
        )))
    ));
}

#[test]
fn test_ensure_committed_commits_even_when_work_fails() {
    let committer = Arc::new(RecordingCommitter::default());
    let membership = FakeMembership::new().with_cluster_topic("events", vec![0]);
    let mut controller = controller_with(events_only(), committer.clone(), &membership);
    controller.start().unwrap();

    let messages = vec![ConsumedMessage::new("events", 0, 9, None)];
    let result: Result<(), WorkError> =
        controller.ensure_committed(&messages, || Err(WorkError::Work("failed")));

    assert!(matches!(result, Err(WorkError::Work("failed"))));
    assert_eq!(committer.committed(), vec![("events".to_string(), 0, 10)]);
}

#[test]
fn test_failed_commit_is_reported() {
    let membership = FakeMembership::new().with_cluster_topic("events", vec![0]);
    let mut controller = controller_with(
        events_only(),
        Arc::new(RecordingCommitter::failing()),
        &membership,
    );
    controller.start().unwrap();

    assert!(matches!(
        controller.commit_offsets(&offsets("events", 0, 1)),
        Err(ConsumerError::Commit(CommitError::Rejected { .. }))
    ));
}
