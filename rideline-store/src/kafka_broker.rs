use async_trait::async_trait;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaResult;
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use rideline_core::broker::{BrokerError, Delivery, MessageBroker, Settlement};
use rideline_shared::contracts::PREFETCH_COUNT;
use rideline_shared::{AmqpMessage, QueueName, RoutingKey};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::broker::BrokerSettings;

/// Offset commits, split out so a failed commit is handled the same way
/// for settled and skipped records.
trait CommitOffsets {
    fn commit_offsets(&self, position: &TopicPartitionList) -> KafkaResult<()>;
}

impl CommitOffsets for StreamConsumer {
    fn commit_offsets(&self, position: &TopicPartitionList) -> KafkaResult<()> {
        self.commit(position, CommitMode::Async)
    }
}

/// Commit past `offset`. A failed commit is logged and the record may be
/// redelivered after a rebalance.
fn commit_position(consumer: &impl CommitOffsets, position: &TopicPartitionList, topic: &str, offset: i64) -> bool {
    match consumer.commit_offsets(position) {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to commit offset {} on {}: {}", offset, topic, e);
            false
        }
    }
}

const METADATA_TIMEOUT: Duration = Duration::from_secs(5);
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Topic exchange mapped onto Kafka: every queue is a single-partition topic
/// `{prefix}.{queue}`, a publish is written to each topic bound to its
/// routing key, and the routing key travels as the record key.
pub struct KafkaBroker {
    hosts: String,
    group_id: String,
    topic_prefix: String,
    producer: FutureProducer,
    admin: AdminClient<DefaultClientContext>,
    closed: AtomicBool,
    shutdown: CancellationToken,
}

impl KafkaBroker {
    /// Create the clients and wait until the cluster answers a metadata
    /// request, per the configured retry policy.
    pub async fn connect(hosts: &str, settings: &BrokerSettings) -> Result<Self, BrokerError> {
        let client_error = |e: rdkafka::error::KafkaError| BrokerError::Connection {
            attempts: 0,
            reason: e.to_string(),
        };

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", hosts)
            .set("message.timeout.ms", "5000")
            .create()
            .map_err(client_error)?;

        let admin: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", hosts)
            .create()
            .map_err(client_error)?;

        let brokers = settings
            .retry_policy()
            .run("Kafka cluster", || {
                let client = producer.clone();
                async move {
                    tokio::task::spawn_blocking(move || {
                        client
                            .client()
                            .fetch_metadata(None, METADATA_TIMEOUT)
                            .map(|metadata| metadata.brokers().len())
                            .map_err(|e| e.to_string())
                    })
                    .await
                    .map_err(|e| e.to_string())?
                }
            })
            .await
            .map_err(|(attempts, reason)| BrokerError::Connection { attempts, reason })?;

        info!("Connected to Kafka at {} ({} brokers)", hosts, brokers);

        Ok(Self {
            hosts: hosts.to_string(),
            group_id: settings.group_id.clone(),
            topic_prefix: settings.topic_prefix.clone(),
            producer,
            admin,
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        })
    }

    fn topic(&self, queue: QueueName) -> String {
        format!("{}.{}", self.topic_prefix, queue)
    }
}

#[async_trait]
impl MessageBroker for KafkaBroker {
    async fn declare_topology(&self) -> Result<(), BrokerError> {
        let names: Vec<String> = QueueName::ALL.iter().map(|q| self.topic(*q)).collect();
        let topics: Vec<NewTopic<'_>> = names
            .iter()
            .map(|name| NewTopic::new(name, 1, TopicReplication::Fixed(1)))
            .collect();

        let results = self
            .admin
            .create_topics(&topics, &AdminOptions::new())
            .await
            .map_err(|e| BrokerError::Topology(e.to_string()))?;

        for result in results {
            match result {
                Ok(topic) => info!("Created topic {}", topic),
                Err((topic, RDKafkaErrorCode::TopicAlreadyExists)) => debug!("Topic {} already exists", topic),
                Err((topic, code)) => {
                    return Err(BrokerError::Topology(format!("topic {}: {}", topic, code)));
                }
            }
        }
        Ok(())
    }

    async fn publish(&self, routing_key: RoutingKey, message: &AmqpMessage) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::Closed);
        }

        let queues = routing_key.bound_queues();
        if queues.is_empty() {
            warn!(
                "Broker returned unroutable message: routingKey={} owner={}",
                routing_key, message.owner_id
            );
            return Ok(());
        }

        let payload = message.to_bytes()?;
        for queue in queues {
            let topic = self.topic(queue);
            let record = FutureRecord::to(&topic)
                .key(routing_key.as_str())
                .payload(&payload);

            if let Err((e, _)) = self.producer.send(record, Timeout::After(SEND_TIMEOUT)).await {
                error!("Failed to send {} to {}: {}", routing_key, topic, e);
                return Err(BrokerError::Publish {
                    routing_key,
                    reason: e.to_string(),
                });
            }
            debug!("Sent {} for owner {} to {}", routing_key, message.owner_id, topic);
        }
        Ok(())
    }

    async fn consume(&self, queue: QueueName) -> Result<mpsc::Receiver<Delivery>, BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::Closed);
        }

        let topic = self.topic(queue);
        let consume_error = |reason: String| BrokerError::Consume { queue, reason };

        // One group per queue so every process competes for the same messages.
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.hosts)
            .set("group.id", format!("{}.{}", self.group_id, queue))
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .create()
            .map_err(|e| consume_error(e.to_string()))?;
        consumer
            .subscribe(&[topic.as_str()])
            .map_err(|e| consume_error(e.to_string()))?;

        let (tx, rx) = mpsc::channel(PREFETCH_COUNT);
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tx.closed() => break,
                    received = consumer.recv() => received,
                };
                let m = match received {
                    Ok(m) => m,
                    Err(e) => {
                        error!("Kafka error on {}: {}", topic, e);
                        continue;
                    }
                };

                let partition = m.partition();
                let offset = m.offset();
                let key = m
                    .key()
                    .and_then(|k| std::str::from_utf8(k).ok())
                    .map(str::to_owned)
                    .unwrap_or_default();
                let body = m.payload().map(<[u8]>::to_vec).unwrap_or_default();
                drop(m);

                let mut position = TopicPartitionList::new();
                if let Err(e) = position.add_partition_offset(&topic, partition, Offset::Offset(offset + 1)) {
                    error!("Bad offset {} on {}: {}", offset, topic, e);
                    continue;
                }

                let routing_key = match RoutingKey::from_str(&key) {
                    Ok(routing_key) => routing_key,
                    Err(e) => {
                        warn!("Skipping record on {} at offset {}: {}", topic, offset, e);
                        commit_position(&consumer, &position, &topic, offset);
                        continue;
                    }
                };

                let (delivery, settled) = Delivery::new(routing_key, body);
                if tx.send(delivery).await.is_err() {
                    break;
                }

                match settled.await {
                    Ok(Settlement::Ack) => {}
                    Ok(Settlement::Reject) => {
                        warn!("Rejected {} on {} at offset {}; dropped", routing_key, queue, offset);
                    }
                    Err(_) => {
                        // Leave the offset uncommitted so the group redelivers it.
                        debug!("Consumer on {} abandoned offset {}", queue, offset);
                        break;
                    }
                }
                commit_position(&consumer, &position, &topic, offset);
            }
            info!("Kafka consumer on {} stopped", topic);
        });

        Ok(rx)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.shutdown.cancel();

        let producer = self.producer.clone();
        match tokio::task::spawn_blocking(move || producer.flush(SEND_TIMEOUT)).await {
            Ok(Ok(())) => info!("Kafka producer flushed"),
            Ok(Err(e)) => warn!("Kafka producer flush failed: {}", e),
            Err(e) => warn!("Kafka producer flush task failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdkafka::error::KafkaError;
    use std::sync::Mutex;

    struct RecordingCommitter {
        fail: bool,
        committed: Mutex<Vec<i64>>,
    }

    impl CommitOffsets for RecordingCommitter {
        fn commit_offsets(&self, position: &TopicPartitionList) -> KafkaResult<()> {
            if self.fail {
                return Err(KafkaError::ConsumerCommit(RDKafkaErrorCode::NoOffset));
            }
            for element in position.elements() {
                if let Offset::Offset(next) = element.offset() {
                    self.committed.lock().unwrap().push(next);
                }
            }
            Ok(())
        }
    }

    fn position(topic: &str, offset: i64) -> TopicPartitionList {
        let mut position = TopicPartitionList::new();
        position
            .add_partition_offset(topic, 0, Offset::Offset(offset + 1))
            .unwrap();
        position
    }

    #[test]
    fn test_commit_failure_is_reported_not_raised() {
        let committer = RecordingCommitter {
            fail: true,
            committed: Mutex::new(Vec::new()),
        };
        assert!(!commit_position(&committer, &position("rideline.driver_trip_response", 7), "rideline.driver_trip_response", 7));
        assert!(committer.committed.lock().unwrap().is_empty());
    }

    #[test]
    fn test_commit_moves_past_the_record() {
        let committer = RecordingCommitter {
            fail: false,
            committed: Mutex::new(Vec::new()),
        };
        assert!(commit_position(&committer, &position("rideline.find_available_drivers", 41), "rideline.find_available_drivers", 41));
        assert_eq!(*committer.committed.lock().unwrap(), vec![42]);
    }
}
