use std::time::Duration;

use async_trait::async_trait;
use common_kafka::config::KafkaConfig;
use common_kafka::kafka_producer::{create_kafka_producer, record_producer_stats};
use futures::future::join_all;
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use rdkafka::producer::{BaseRecord, DeliveryResult, Producer, ProducerContext, ThreadedProducer};
use rdkafka::{ClientContext, Statistics};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::broker::Publisher;
use crate::producer::outcome::{FailureKind, PublishOutcome, PublishResponse};
use crate::producer::request::PublishRequest;

type DeliveryReport = Result<i64, KafkaError>;

/// Routes each delivery report back to the task waiting on that message.
#[derive(Default)]
pub struct DeliveryContext;

impl ClientContext for DeliveryContext {
    fn stats(&self, stats: Statistics) {
        record_producer_stats(&stats);
    }
}

impl ProducerContext for DeliveryContext {
    type DeliveryOpaque = Box<oneshot::Sender<DeliveryReport>>;

    fn delivery(&self, delivery_result: &DeliveryResult<'_>, reply: Self::DeliveryOpaque) {
        let report = match delivery_result {
            Ok(message) => Ok(message.offset()),
            Err((e, _)) => Err(e.clone()),
        };
        if reply.send(report).is_err() {
            debug!("Delivery report dropped, publish round no longer waiting");
        }
    }
}

/// Publishes every request to its explicit partition. A request succeeds when
/// all its messages are acknowledged; the response offset is the first
/// message's offset.
pub struct KafkaPublisher {
    producer: ThreadedProducer<DeliveryContext>,
}

impl KafkaPublisher {
    pub fn new(producer: ThreadedProducer<DeliveryContext>) -> Self {
        Self { producer }
    }

    pub fn from_config(config: &KafkaConfig) -> Result<Self, KafkaError> {
        Ok(Self::new(create_kafka_producer(config, DeliveryContext)?))
    }

    /// Waits for queued messages to be delivered.
    pub fn flush(&self, timeout: Duration) -> Result<(), KafkaError> {
        self.producer.flush(timeout)
    }

    async fn publish_request(&self, request: &PublishRequest) -> PublishResponse {
        let tp = request.topic_partition().clone();
        let mut pending = Vec::with_capacity(request.messages().len());

        for payload in request.messages() {
            let (tx, rx) = oneshot::channel();
            let record = BaseRecord::<(), [u8], _>::with_opaque_to(request.topic(), Box::new(tx))
                .partition(request.partition())
                .payload(payload.as_slice());

            if let Err((e, _)) = self.producer.send(record) {
                // never enqueued, so nothing after this message can land either
                warn!(
                    topic = request.topic(),
                    partition = request.partition(),
                    error = ?e,
                    "Failed to enqueue message"
                );
                return PublishResponse::new(tp, PublishOutcome::transport_failure(e.to_string()));
            }
            pending.push(rx);
        }

        let mut first_offset = None;
        let mut failure = None;
        for rx in pending {
            match rx.await {
                Ok(Ok(offset)) => {
                    first_offset.get_or_insert(offset);
                }
                Ok(Err(e)) => {
                    failure.get_or_insert_with(|| classify_delivery_error(&e));
                }
                Err(_) => {
                    failure.get_or_insert_with(|| {
                        PublishOutcome::transport_failure("delivery report canceled")
                    });
                }
            }
        }

        let outcome = match (failure, first_offset) {
            (Some(failure), _) => failure,
            (None, Some(offset)) => PublishOutcome::Success { offset },
            // empty request, nothing to acknowledge
            (None, None) => PublishOutcome::transport_failure("request has no messages"),
        };
        PublishResponse::new(tp, outcome)
    }
}

#[async_trait]
impl Publisher for KafkaPublisher {
    async fn publish(&self, requests: &[PublishRequest]) -> Vec<PublishResponse> {
        join_all(requests.iter().map(|r| self.publish_request(r))).await
    }
}

/// Broker error codes are positive; librdkafka's local codes (timeouts,
/// transport) are negative and mean the broker never answered.
fn classify_delivery_error(e: &KafkaError) -> PublishOutcome {
    match e {
        KafkaError::MessageProduction(code) if (*code as i32) > 0 => {
            PublishOutcome::from_broker_reply(*code as i32, -1)
        }
        other => PublishOutcome::Failure(FailureKind::Transport(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdkafka::types::RDKafkaErrorCode;

    #[test]
    fn test_classify_delivery_error() {
        assert_eq!(
            classify_delivery_error(&KafkaError::MessageProduction(
                RDKafkaErrorCode::NotLeaderForPartition
            )),
            PublishOutcome::Failure(FailureKind::Broker { code: 6 })
        );
        assert!(matches!(
            classify_delivery_error(&KafkaError::MessageProduction(
                RDKafkaErrorCode::MessageTimedOut
            )),
            PublishOutcome::Failure(FailureKind::Transport(_))
        ));
        assert!(matches!(
            classify_delivery_error(&KafkaError::Canceled),
            PublishOutcome::Failure(FailureKind::Transport(_))
        ));
    }
}
