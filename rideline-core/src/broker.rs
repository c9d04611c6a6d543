use async_trait::async_trait;
use rideline_shared::{AmqpMessage, QueueName, RoutingKey};
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Broker unreachable after {attempts} attempts: {reason}")]
    Connection { attempts: u32, reason: String },

    #[error("Topology declaration failed: {0}")]
    Topology(String),

    #[error("Publish with routing key {routing_key} failed: {reason}")]
    Publish { routing_key: RoutingKey, reason: String },

    #[error("Consume on queue {queue} failed: {reason}")]
    Consume { queue: QueueName, reason: String },

    #[error("Envelope encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Broker connection is closed")]
    Closed,
}

/// How a consumer settled a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Ack,
    /// Dropped without requeue
    Reject,
}

/// One message handed to a consumer. It must be settled with [`Delivery::ack`]
/// or [`Delivery::reject`]. Dropping it unsettled hands it back to the broker
/// for redelivery, as happens when a consumer goes away mid-message.
#[derive(Debug)]
pub struct Delivery {
    pub routing_key: RoutingKey,
    pub body: Vec<u8>,
    settle_tx: oneshot::Sender<Settlement>,
}

impl Delivery {
    /// Build a delivery plus the receiver the broker side waits on before
    /// handing out the next message.
    pub fn new(routing_key: RoutingKey, body: Vec<u8>) -> (Self, oneshot::Receiver<Settlement>) {
        let (settle_tx, settle_rx) = oneshot::channel();
        (
            Self {
                routing_key,
                body,
                settle_tx,
            },
            settle_rx,
        )
    }

    pub fn message(&self) -> Result<AmqpMessage, serde_json::Error> {
        AmqpMessage::from_bytes(&self.body)
    }

    pub fn ack(self) {
        let _ = self.settle_tx.send(Settlement::Ack);
    }

    pub fn reject(self) {
        let _ = self.settle_tx.send(Settlement::Reject);
    }
}

/// Connection to the topic broker carrying every trip, driver and payment message.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Declare the exchange and every queue with its bindings. Idempotent.
    async fn declare_topology(&self) -> Result<(), BrokerError>;

    /// Publish a persistent message on the trip exchange. Unroutable messages
    /// are reported (logged) rather than failing the call.
    async fn publish(&self, routing_key: RoutingKey, message: &AmqpMessage) -> Result<(), BrokerError>;

    /// Start a consumer on `queue`. The broker hands out at most one unsettled
    /// delivery at a time on the returned channel.
    async fn consume(&self, queue: QueueName) -> Result<mpsc::Receiver<Delivery>, BrokerError>;

    async fn close(&self);
}
