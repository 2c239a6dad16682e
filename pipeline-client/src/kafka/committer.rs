use std::sync::{Mutex, PoisonError};

use rdkafka::consumer::{BaseConsumer, CommitMode, Consumer};
use rdkafka::error::KafkaError;
use rdkafka::{ClientConfig, Offset, TopicPartitionList};
use tracing::{debug, info};

use crate::broker::{CommitError, OffsetCommitter};
use crate::kafka::membership::SharedMember;
use crate::types::PartitionOffset;

/// Commits offsets synchronously. While a group member is running the commit
/// goes through it; otherwise a standalone consumer for the same group is
/// created on first use and kept until [`OffsetCommitter::close`].
pub struct KafkaOffsetCommitter {
    client_config: ClientConfig,
    member: SharedMember,
    standalone: Mutex<Option<BaseConsumer>>,
}

impl KafkaOffsetCommitter {
    pub fn new(client_config: ClientConfig, member: SharedMember) -> Self {
        Self {
            client_config,
            member,
            standalone: Mutex::new(None),
        }
    }

    fn commit_standalone(&self, tpl: &TopicPartitionList) -> Result<(), KafkaError> {
        let mut standalone = self
            .standalone
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let consumer = match standalone.take() {
            Some(consumer) => consumer,
            None => self.client_config.create()?,
        };
        let result = consumer.commit(tpl, CommitMode::Sync);
        *standalone = Some(consumer);
        result
    }
}

impl OffsetCommitter for KafkaOffsetCommitter {
    fn commit_offsets(&self, group: &str, offsets: &[PartitionOffset]) -> Result<(), CommitError> {
        let tpl = commit_list(offsets).map_err(|e| CommitError::Kafka {
            group: group.to_string(),
            source: e,
        })?;

        let member = self
            .member
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let result = match member {
            Some(consumer) => consumer.commit(&tpl, CommitMode::Sync),
            None => {
                debug!(group = group, "No running member, committing standalone");
                self.commit_standalone(&tpl)
            }
        };

        result.map_err(|e| CommitError::Kafka {
            group: group.to_string(),
            source: e,
        })
    }

    fn close(&self) {
        if self
            .standalone
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
        {
            info!("Closed standalone commit consumer");
        }
    }
}

fn commit_list(offsets: &[PartitionOffset]) -> Result<TopicPartitionList, KafkaError> {
    let mut tpl = TopicPartitionList::with_capacity(offsets.len());
    for offset in offsets {
        tpl.add_partition_offset(
            offset.topic(),
            offset.partition_number(),
            Offset::Offset(offset.offset()),
        )?;
    }
    Ok(tpl)
}
