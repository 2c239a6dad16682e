use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use common_kafka::kafka_consumer::ConsumerConfigBuilder;
use rdkafka::consumer::{BaseConsumer, Consumer};
use rdkafka::error::KafkaError;
use rdkafka::message::{BorrowedMessage, Headers, Message};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::ClientConfig;
use tracing::{debug, error, info, warn};

use crate::broker::{GroupMembership, MembershipError};
use crate::config::Config;
use crate::consumer::message::ConsumedMessage;
use crate::consumer::rebalance::RebalanceCoordinator;
use crate::kafka::committer::KafkaOffsetCommitter;
use crate::kafka::context::PipelineConsumerContext;
use crate::metrics_consts::CONSUMER_POLL_ERRORS_COUNTER;

pub const SCHEMA_ID_HEADER: &str = "schema_id";

const ASSIGNMENT_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub type MemberConsumer = BaseConsumer<PipelineConsumerContext>;

/// The running group member, shared with the committer so commits are made by
/// the consumer the group coordinator knows about.
pub type SharedMember = Arc<RwLock<Option<Arc<MemberConsumer>>>>;

pub struct KafkaGroupMembership {
    client_config: ClientConfig,
    member: SharedMember,
    assignment_timeout: Duration,
    // messages polled while waiting for the first assignment
    buffered: VecDeque<ConsumedMessage>,
}

impl KafkaGroupMembership {
    pub fn new(client_config: ClientConfig, assignment_timeout: Duration) -> Self {
        Self {
            client_config,
            member: Arc::new(RwLock::new(None)),
            assignment_timeout,
            buffered: VecDeque::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let client_config =
            ConsumerConfigBuilder::for_group_consumer(&config.kafka, &config.consumer).build();
        Self::new(client_config, config.assignment_timeout())
    }

    /// A committer that commits through this member while it runs, and through
    /// its own consumer otherwise.
    pub fn committer(&self) -> KafkaOffsetCommitter {
        KafkaOffsetCommitter::new(self.client_config.clone(), Arc::clone(&self.member))
    }

    fn current(&self) -> Option<Arc<MemberConsumer>> {
        self.member
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn wait_for_assignment(&mut self, consumer: &MemberConsumer) -> Result<(), MembershipError> {
        let deadline = Instant::now() + self.assignment_timeout;
        while consumer.context().assignments() == 0 {
            if Instant::now() >= deadline {
                warn!(
                    timeout_ms = self.assignment_timeout.as_millis() as u64,
                    "No partition assignment received before timeout, continuing"
                );
                return Ok(());
            }
            match consumer.poll(ASSIGNMENT_POLL_INTERVAL) {
                Some(Ok(message)) => self.buffered.push_back(convert_message(&message)),
                Some(Err(e)) => check_poll_error(e)?,
                None => {}
            }
        }
        Ok(())
    }
}

impl GroupMembership for KafkaGroupMembership {
    fn start(
        &mut self,
        topics: &[String],
        coordinator: Arc<RebalanceCoordinator>,
    ) -> Result<(), MembershipError> {
        if self.current().is_some() {
            return Err(MembershipError::Other(
                "group member is already started".to_string(),
            ));
        }

        let consumer: MemberConsumer = self
            .client_config
            .create_with_context(PipelineConsumerContext::new(coordinator))
            .map_err(|e| MembershipError::Kafka {
                operation: "create consumer",
                source: e,
            })?;

        if topics.is_empty() {
            info!("No topics to subscribe to, member started idle");
        } else {
            let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
            consumer
                .subscribe(&topic_refs)
                .map_err(|e| MembershipError::Kafka {
                    operation: "subscribe",
                    source: e,
                })?;
            info!(topics = ?topics, "Subscribed, waiting for assignment");
            self.wait_for_assignment(&consumer)?;
        }

        *self.member.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(consumer));
        Ok(())
    }

    fn stop(&mut self) -> Result<(), MembershipError> {
        self.buffered.clear();
        let member = self
            .member
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match member {
            Some(consumer) => {
                consumer.unsubscribe();
                debug!("Left consumer group");
                Ok(())
            }
            None => Err(MembershipError::NotStarted),
        }
    }

    fn poll(&mut self, timeout: Duration) -> Result<Option<ConsumedMessage>, MembershipError> {
        if let Some(message) = self.buffered.pop_front() {
            return Ok(Some(message));
        }

        let consumer = self.current().ok_or(MembershipError::NotStarted)?;
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match consumer.poll(remaining) {
                None => return Ok(None),
                Some(Ok(message)) => return Ok(Some(convert_message(&message))),
                Some(Err(e)) => {
                    check_poll_error(e)?;
                    if remaining.is_zero() {
                        return Ok(None);
                    }
                }
            }
        }
    }
}

/// Logs and counts a poll error. Only fatal errors are returned, everything
/// else (a subscribed topic that does not exist yet, partition EOF, broker
/// reconnects) leaves the member running.
fn check_poll_error(e: KafkaError) -> Result<(), MembershipError> {
    let (level, kind) = classify_poll_error(&e);
    metrics::counter!(CONSUMER_POLL_ERRORS_COUNTER, "level" => level, "error" => kind)
        .increment(1);
    if level == "fatal" {
        error!(error = ?e, "Fatal consumer error");
        return Err(MembershipError::Kafka {
            operation: "poll",
            source: e,
        });
    }
    warn!(error = ?e, "Consumer error, continuing");
    Ok(())
}

fn classify_poll_error(e: &KafkaError) -> (&'static str, &'static str) {
    match e {
        KafkaError::MessageConsumption(code) => match code {
            RDKafkaErrorCode::UnknownTopicOrPartition | RDKafkaErrorCode::UnknownTopic => {
                ("warn", "unknown_topic")
            }
            RDKafkaErrorCode::PartitionEOF => ("info", "partition_eof"),
            RDKafkaErrorCode::OffsetOutOfRange => ("info", "offset_out_of_range"),
            _ => ("warn", "consumer"),
        },
        KafkaError::MessageConsumptionFatal(_) => ("fatal", "consumer"),
        KafkaError::Global(RDKafkaErrorCode::Authentication) => ("fatal", "authentication"),
        KafkaError::Global(RDKafkaErrorCode::Fatal) => ("fatal", "global"),
        KafkaError::Global(_) => ("warn", "global"),
        KafkaError::Canceled => ("fatal", "canceled"),
        _ => ("warn", "unexpected"),
    }
}

fn convert_message(message: &BorrowedMessage<'_>) -> ConsumedMessage {
    let consumed = ConsumedMessage::new(
        message.topic(),
        message.partition(),
        message.offset(),
        message.payload().map(<[u8]>::to_vec),
    );
    match schema_id_of(message) {
        Some(schema_id) => consumed.with_schema_id(schema_id),
        None => consumed,
    }
}

fn schema_id_of(message: &BorrowedMessage<'_>) -> Option<i64> {
    let headers = message.headers()?;
    headers
        .iter()
        .find(|header| header.key == SCHEMA_ID_HEADER)
        .and_then(|header| header.value)
        .and_then(|value| std::str::from_utf8(value).ok())
        .and_then(|value| value.trim().parse().ok())
}
