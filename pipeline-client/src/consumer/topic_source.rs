use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A topic as reported by the discovery service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicDescriptor {
    pub name: String,
    pub namespace: String,
    pub source: String,
    /// Creation time, unix seconds
    pub created_at: i64,
}

pub type TopicFilterFn = Arc<dyn Fn(Vec<TopicDescriptor>) -> Vec<TopicDescriptor> + Send + Sync>;

/// Criteria for discovering topics. Unset fields match everything;
/// `created_after` is inclusive. `filter_fn` runs last, over the topics the
/// other criteria already selected.
#[derive(Clone, Default)]
pub struct TopicFilter {
    pub namespace: Option<String>,
    pub source: Option<String>,
    pub created_after: Option<i64>,
    pub filter_fn: Option<TopicFilterFn>,
}

impl TopicFilter {
    pub fn for_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..Default::default()
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn created_after(mut self, timestamp: i64) -> Self {
        self.created_after = Some(timestamp);
        self
    }

    pub fn with_filter_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(Vec<TopicDescriptor>) -> Vec<TopicDescriptor> + Send + Sync + 'static,
    {
        self.filter_fn = Some(Arc::new(f));
        self
    }

    /// Whether `topic` passes the namespace, source and creation criteria.
    pub fn matches(&self, topic: &TopicDescriptor) -> bool {
        self.namespace.as_ref().is_none_or(|n| *n == topic.namespace)
            && self.source.as_ref().is_none_or(|s| *s == topic.source)
            && self.created_after.is_none_or(|t| topic.created_at >= t)
    }

    /// Applies the custom filter, if any, to already matched topics.
    pub fn apply_filter_fn(&self, topics: Vec<TopicDescriptor>) -> Vec<TopicDescriptor> {
        match &self.filter_fn {
            Some(f) => f(topics),
            None => topics,
        }
    }
}

impl fmt::Debug for TopicFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicFilter")
            .field("namespace", &self.namespace)
            .field("source", &self.source)
            .field("created_after", &self.created_after)
            .field("filter_fn", &self.filter_fn.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("topic discovery failed: {0}")]
    Lookup(String),
}

/// Looks up topics by criteria. Implementations must apply
/// [`TopicFilter::matches`] semantics; the controller applies `filter_fn`.
pub trait TopicDiscovery: Send + Sync {
    fn topics_by_criteria(&self, filter: &TopicFilter)
        -> Result<Vec<TopicDescriptor>, DiscoveryError>;
}

/// Where the consumer gets its topic list from on a refresh.
pub trait ConsumerSource: Send + Sync {
    fn topics(&self) -> Result<Vec<String>, DiscoveryError>;
}

/// A fixed list of topics.
#[derive(Debug, Clone)]
pub struct FixedTopics {
    topics: Vec<String>,
}

impl FixedTopics {
    pub fn new<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            topics: topics.into_iter().map(Into::into).collect(),
        }
    }
}

impl ConsumerSource for FixedTopics {
    fn topics(&self) -> Result<Vec<String>, DiscoveryError> {
        Ok(self.topics.clone())
    }
}

/// Every topic the discovery service reports for a filter.
pub struct DiscoveredTopics {
    discovery: Arc<dyn TopicDiscovery>,
    filter: TopicFilter,
}

impl DiscoveredTopics {
    pub fn new(discovery: Arc<dyn TopicDiscovery>, filter: TopicFilter) -> Self {
        Self { discovery, filter }
    }
}

impl ConsumerSource for DiscoveredTopics {
    fn topics(&self) -> Result<Vec<String>, DiscoveryError> {
        let found = self.discovery.topics_by_criteria(&self.filter)?;
        Ok(self
            .filter
            .apply_filter_fn(found)
            .into_iter()
            .map(|t| t.name)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{topic_descriptor, FakeTopicDiscovery};

    #[test]
    fn test_filter_matches() {
        let topic = topic_descriptor("t1", "billing", "orders", 100);

        assert!(TopicFilter::default().matches(&topic));
        assert!(TopicFilter::for_namespace("billing").matches(&topic));
        assert!(TopicFilter::for_namespace("billing")
            .with_source("orders")
            .created_after(100)
            .matches(&topic));
        assert!(!TopicFilter::for_namespace("search").matches(&topic));
        assert!(!TopicFilter::default().created_after(101).matches(&topic));
    }

    #[test]
    fn test_discovered_topics_apply_filter_fn() {
        let discovery = Arc::new(FakeTopicDiscovery::new(vec![
            topic_descriptor("keep_me", "billing", "orders", 1),
            topic_descriptor("skip_me", "billing", "orders", 2),
            topic_descriptor("other_ns", "search", "orders", 3),
        ]));
        let filter = TopicFilter::for_namespace("billing").with_filter_fn(|topics| {
            topics
                .into_iter()
                .filter(|t| t.name.starts_with("keep"))
                .collect()
        });

        let source = DiscoveredTopics::new(discovery, filter);

        assert_eq!(source.topics().unwrap(), vec!["keep_me".to_string()]);
    }

    #[test]
    fn test_fixed_topics() {
        let source = FixedTopics::new(["a", "b"]);
        assert_eq!(source.topics().unwrap(), vec!["a", "b"]);
    }
}
