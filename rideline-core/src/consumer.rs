use async_trait::async_trait;
use rideline_shared::{AmqpMessage, QueueName, RoutingKey};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::broker::{BrokerError, MessageBroker};

/// Business logic run for every delivery on a queue.
///
/// `Ok` acknowledges the delivery. `Err` rejects it without requeue, so a
/// poison message is dropped instead of looping.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, routing_key: RoutingKey, message: AmqpMessage) -> anyhow::Result<()>;
}

/// A single consumer task bound to one queue.
pub struct QueueWorker {
    queue: QueueName,
    handle: JoinHandle<()>,
}

impl QueueWorker {
    /// Subscribe to `queue` and process deliveries strictly one at a time
    /// until `shutdown` fires or the broker closes the consumer.
    pub async fn spawn(
        broker: Arc<dyn MessageBroker>,
        queue: QueueName,
        handler: Arc<dyn MessageHandler>,
        shutdown: CancellationToken,
    ) -> Result<Self, BrokerError> {
        let mut deliveries = broker.consume(queue).await?;
        info!("Consumer started on queue {}", queue);

        let handle = tokio::spawn(async move {
            loop {
                let delivery = tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Consumer on queue {} shutting down", queue);
                        break;
                    }
                    delivery = deliveries.recv() => match delivery {
                        Some(delivery) => delivery,
                        None => {
                            info!("Broker closed consumer on queue {}", queue);
                            break;
                        }
                    },
                };

                let routing_key = delivery.routing_key;
                let message = match delivery.message() {
                    Ok(message) => message,
                    Err(e) => {
                        error!("Undecodable envelope on {} ({}): {}", queue, routing_key, e);
                        delivery.reject();
                        continue;
                    }
                };

                debug!("Received {} for owner {} on {}", routing_key, message.owner_id, queue);
                match handler.handle(routing_key, message).await {
                    Ok(()) => delivery.ack(),
                    Err(e) => {
                        // No dead-letter queue yet: rejected messages are gone.
                        error!("Failed to handle {} on {}, dropping: {:#}", routing_key, queue, e);
                        delivery.reject();
                    }
                }
            }
        });

        Ok(Self { queue, handle })
    }

    pub fn queue(&self) -> QueueName {
        self.queue
    }

    /// Wait for the worker task to finish its current delivery and exit.
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            error!("Consumer on queue {} panicked: {}", self.queue, e);
        }
    }
}
