pub mod controller;
pub mod message;
pub mod offset_cache;
pub mod rebalance;
pub mod topic_source;
pub mod topic_state;

pub use controller::{ConsumerError, ConsumerTopicController, PreTopicRefreshCallback};
pub use message::{next_read_offsets, ConsumedMessage};
pub use offset_cache::OffsetCommitCache;
pub use rebalance::{RebalanceCoordinator, RebalanceListener};
pub use topic_source::{
    ConsumerSource, DiscoveredTopics, DiscoveryError, FixedTopics, TopicDescriptor,
    TopicDiscovery, TopicFilter,
};
pub use topic_state::{ConsumerTopicState, TopicStateMap, TrackedTopics};
