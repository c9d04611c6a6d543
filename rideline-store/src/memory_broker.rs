use async_trait::async_trait;
use rideline_core::broker::{BrokerError, Delivery, MessageBroker, Settlement};
use rideline_shared::contracts::{PREFETCH_COUNT, TRIP_EXCHANGE};
use rideline_shared::{AmqpMessage, QueueName, RoutingKey};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A publish as seen by the exchange, kept for inspection.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub routing_key: RoutingKey,
    pub message: AmqpMessage,
    /// Empty when the message was unroutable and returned
    pub routed_to: Vec<QueueName>,
}

struct StoredMessage {
    routing_key: RoutingKey,
    body: Vec<u8>,
}

struct QueueState {
    name: QueueName,
    tx: mpsc::UnboundedSender<StoredMessage>,
    // Competing consumers take turns on the single receiver.
    rx: Mutex<mpsc::UnboundedReceiver<StoredMessage>>,
    depth: AtomicUsize,
    acked: AtomicUsize,
    rejected: AtomicUsize,
}

impl QueueState {
    fn new(name: QueueName) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            name,
            tx,
            rx: Mutex::new(rx),
            depth: AtomicUsize::new(0),
            acked: AtomicUsize::new(0),
            rejected: AtomicUsize::new(0),
        }
    }

    fn enqueue(&self, message: StoredMessage) {
        self.depth.fetch_add(1, Ordering::SeqCst);
        // The receiver lives as long as the queue, so this cannot fail.
        let _ = self.tx.send(message);
    }
}

/// Publishes kept for inspection before the oldest are discarded.
pub const PUBLISHED_LOG_CAPACITY: usize = 1024;

struct Inner {
    queues: RwLock<HashMap<QueueName, Arc<QueueState>>>,
    published: std::sync::Mutex<VecDeque<PublishedMessage>>,
    log_capacity: usize,
    closed: AtomicBool,
    shutdown: CancellationToken,
}

impl Inner {
    fn new(log_capacity: usize) -> Self {
        Self {
            queues: RwLock::new(HashMap::new()),
            published: std::sync::Mutex::new(VecDeque::new()),
            log_capacity,
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        }
    }
}

/// Process-local topic exchange with durable-queue semantics for a single
/// process: direct key bindings, prefetch 1 per consumer, ack / reject
/// without requeue, and requeue of deliveries a consumer abandons.
#[derive(Clone)]
pub struct InMemoryBroker {
    inner: Arc<Inner>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::with_log_capacity(PUBLISHED_LOG_CAPACITY)
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `capacity` recent publishes for inspection; 0 keeps none.
    pub fn with_log_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner::new(capacity)),
        }
    }

    pub async fn is_declared(&self) -> bool {
        !self.inner.queues.read().await.is_empty()
    }

    /// The most recent publishes accepted by the exchange, oldest first.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.inner
            .published
            .lock()
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn published_with(&self, routing_key: RoutingKey) -> Vec<PublishedMessage> {
        self.published()
            .into_iter()
            .filter(|p| p.routing_key == routing_key)
            .collect()
    }

    /// Publishes no queue was bound to.
    pub fn returned(&self) -> Vec<PublishedMessage> {
        self.published()
            .into_iter()
            .filter(|p| p.routed_to.is_empty())
            .collect()
    }

    /// Messages waiting in `queue` that no consumer has taken yet.
    pub async fn depth(&self, queue: QueueName) -> usize {
        self.stat(queue, |q| q.depth.load(Ordering::SeqCst)).await
    }

    pub async fn acked(&self, queue: QueueName) -> usize {
        self.stat(queue, |q| q.acked.load(Ordering::SeqCst)).await
    }

    pub async fn rejected(&self, queue: QueueName) -> usize {
        self.stat(queue, |q| q.rejected.load(Ordering::SeqCst)).await
    }

    async fn stat(&self, queue: QueueName, read: impl Fn(&QueueState) -> usize) -> usize {
        self.inner
            .queues
            .read()
            .await
            .get(&queue)
            .map(|q| read(q))
            .unwrap_or(0)
    }

    fn record(&self, published: PublishedMessage) {
        if self.inner.log_capacity == 0 {
            return;
        }
        if let Ok(mut log) = self.inner.published.lock() {
            while log.len() >= self.inner.log_capacity {
                log.pop_front();
            }
            log.push_back(published);
        }
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn declare_topology(&self) -> Result<(), BrokerError> {
        let mut queues = self.inner.queues.write().await;
        for name in QueueName::ALL {
            queues
                .entry(name)
                .or_insert_with(|| Arc::new(QueueState::new(name)));
        }
        info!("Declared exchange {} with {} queues", TRIP_EXCHANGE, queues.len());
        Ok(())
    }

    async fn publish(&self, routing_key: RoutingKey, message: &AmqpMessage) -> Result<(), BrokerError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::Closed);
        }

        let body = message.to_bytes()?;
        let queues = self.inner.queues.read().await;
        if queues.is_empty() {
            return Err(BrokerError::Publish {
                routing_key,
                reason: format!("exchange {} is not declared", TRIP_EXCHANGE),
            });
        }

        let routed_to = routing_key.bound_queues();
        if routed_to.is_empty() {
            warn!(
                "Broker returned unroutable message: exchange={} routingKey={} owner={}",
                TRIP_EXCHANGE, routing_key, message.owner_id
            );
        }

        for name in &routed_to {
            if let Some(queue) = queues.get(name) {
                queue.enqueue(StoredMessage {
                    routing_key,
                    body: body.clone(),
                });
            }
        }
        debug!("Published {} for owner {} to {:?}", routing_key, message.owner_id, routed_to);

        self.record(PublishedMessage {
            routing_key,
            message: message.clone(),
            routed_to,
        });
        Ok(())
    }

    async fn consume(&self, queue: QueueName) -> Result<mpsc::Receiver<Delivery>, BrokerError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::Closed);
        }

        let state = self
            .inner
            .queues
            .read()
            .await
            .get(&queue)
            .cloned()
            .ok_or_else(|| BrokerError::Consume {
                queue,
                reason: "queue is not declared".to_string(),
            })?;

        let (tx, rx) = mpsc::channel(PREFETCH_COUNT);
        let shutdown = self.inner.shutdown.clone();

        tokio::spawn(async move {
            loop {
                let stored = {
                    let mut source = tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tx.closed() => break,
                        source = state.rx.lock() => source,
                    };
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tx.closed() => break,
                        stored = source.recv() => stored,
                    }
                };
                let Some(stored) = stored else { break };
                state.depth.fetch_sub(1, Ordering::SeqCst);

                let (delivery, settled) = Delivery::new(stored.routing_key, stored.body.clone());
                if tx.send(delivery).await.is_err() {
                    state.enqueue(stored);
                    break;
                }

                match settled.await {
                    Ok(Settlement::Ack) => {
                        state.acked.fetch_add(1, Ordering::SeqCst);
                    }
                    Ok(Settlement::Reject) => {
                        state.rejected.fetch_add(1, Ordering::SeqCst);
                        warn!("Rejected {} on {}; dropped without requeue", stored.routing_key, state.name);
                    }
                    Err(_) => {
                        debug!("Consumer on {} abandoned a delivery, requeueing", state.name);
                        state.enqueue(stored);
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.shutdown.cancel();
        info!("In-memory broker closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn declared() -> InMemoryBroker {
        let broker = InMemoryBroker::new();
        broker.declare_topology().await.unwrap();
        broker
    }

    fn envelope(owner: &str) -> AmqpMessage {
        AmqpMessage::new(owner, &serde_json::json!({ "n": owner })).unwrap()
    }

    #[tokio::test]
    async fn test_publish_requires_topology() {
        let broker = InMemoryBroker::new();
        let result = broker.publish(RoutingKey::TripCreated, &envelope("rider-1")).await;
        assert!(matches!(result, Err(BrokerError::Publish { .. })));
    }

    #[tokio::test]
    async fn test_redeclaring_topology_keeps_messages() {
        let broker = InMemoryBroker::new();
        assert!(!broker.is_declared().await);
        broker.declare_topology().await.unwrap();
        assert!(broker.is_declared().await);
        broker.publish(RoutingKey::TripCreated, &envelope("rider-1")).await.unwrap();

        broker.declare_topology().await.unwrap();
        assert_eq!(broker.depth(QueueName::FindAvailableDrivers).await, 1);
    }

    #[tokio::test]
    async fn test_routes_by_binding() {
        let broker = declared().await;
        broker.publish(RoutingKey::TripCreated, &envelope("rider-1")).await.unwrap();
        broker.publish(RoutingKey::TripDriverNotInterested, &envelope("rider-1")).await.unwrap();
        broker.publish(RoutingKey::DriverTripDecline, &envelope("driver-1")).await.unwrap();

        assert_eq!(broker.depth(QueueName::FindAvailableDrivers).await, 2);
        assert_eq!(broker.depth(QueueName::DriverTripResponse).await, 1);
        assert_eq!(broker.depth(QueueName::NotifyDriverAssign).await, 0);
    }

    #[tokio::test]
    async fn test_unroutable_is_returned_not_failed() {
        let broker = declared().await;
        broker
            .publish(RoutingKey::PaymentCreateSession, &envelope("rider-1"))
            .await
            .unwrap();

        let returned = broker.returned();
        assert_eq!(returned.len(), 1);
        assert_eq!(returned[0].routing_key, RoutingKey::PaymentCreateSession);
    }

    #[tokio::test]
    async fn test_publish_log_is_bounded_while_consumed() {
        let broker = InMemoryBroker::with_log_capacity(16);
        broker.declare_topology().await.unwrap();
        let mut rx = broker.consume(QueueName::FindAvailableDrivers).await.unwrap();

        for n in 0..500 {
            broker
                .publish(RoutingKey::TripCreated, &envelope(&format!("rider-{}", n)))
                .await
                .unwrap();
            rx.recv().await.unwrap().ack();
        }

        let log = broker.published();
        assert_eq!(log.len(), 16);
        assert_eq!(log[0].message.owner_id, "rider-484");
        assert_eq!(log[15].message.owner_id, "rider-499");
    }

    #[tokio::test]
    async fn test_zero_capacity_keeps_no_log() {
        let broker = InMemoryBroker::with_log_capacity(0);
        broker.declare_topology().await.unwrap();
        broker.publish(RoutingKey::TripCreated, &envelope("rider-1")).await.unwrap();

        assert!(broker.published().is_empty());
        assert_eq!(broker.depth(QueueName::FindAvailableDrivers).await, 1);
    }

    #[tokio::test]
    async fn test_prefetch_one_per_consumer() {
        let broker = declared().await;
        broker.publish(RoutingKey::TripCreated, &envelope("a")).await.unwrap();
        broker.publish(RoutingKey::TripCreated, &envelope("b")).await.unwrap();

        let mut rx = broker.consume(QueueName::FindAvailableDrivers).await.unwrap();
        let first = rx.recv().await.unwrap();
        assert_eq!(first.message().unwrap().owner_id, "a");

        // Nothing else is handed out while the first is unsettled.
        assert!(timeout(Duration::from_millis(50), rx.recv()).await.is_err());

        first.ack();
        let second = rx.recv().await.unwrap();
        assert_eq!(second.message().unwrap().owner_id, "b");
        second.reject();

        // Let the worker observe the reject.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(broker.acked(QueueName::FindAvailableDrivers).await, 1);
        assert_eq!(broker.rejected(QueueName::FindAvailableDrivers).await, 1);
        assert_eq!(broker.depth(QueueName::FindAvailableDrivers).await, 0);
    }

    #[tokio::test]
    async fn test_competing_consumers_share_a_queue() {
        let broker = declared().await;
        let mut c1 = broker.consume(QueueName::DriverTripResponse).await.unwrap();
        let mut c2 = broker.consume(QueueName::DriverTripResponse).await.unwrap();

        broker.publish(RoutingKey::DriverTripAccept, &envelope("d1")).await.unwrap();
        broker.publish(RoutingKey::DriverTripAccept, &envelope("d2")).await.unwrap();

        let a = timeout(Duration::from_secs(1), c1.recv()).await.unwrap().unwrap();
        let b = timeout(Duration::from_secs(1), c2.recv()).await.unwrap().unwrap();

        let mut owners = vec![a.message().unwrap().owner_id, b.message().unwrap().owner_id];
        owners.sort();
        assert_eq!(owners, vec!["d1", "d2"]);
    }

    #[tokio::test]
    async fn test_abandoned_delivery_is_requeued() {
        let broker = declared().await;
        broker.publish(RoutingKey::TripDriverAssigned, &envelope("rider-9")).await.unwrap();

        let mut rx = broker.consume(QueueName::NotifyDriverAssign).await.unwrap();
        let delivery = rx.recv().await.unwrap();
        drop(delivery);
        drop(rx);

        let mut rx = broker.consume(QueueName::NotifyDriverAssign).await.unwrap();
        let again = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(again.message().unwrap().owner_id, "rider-9");
    }

    #[tokio::test]
    async fn test_closed_broker_refuses_work() {
        let broker = declared().await;
        broker.close().await;

        assert!(matches!(
            broker.publish(RoutingKey::TripCreated, &envelope("x")).await,
            Err(BrokerError::Closed)
        ));
        assert!(matches!(
            broker.consume(QueueName::FindAvailableDrivers).await,
            Err(BrokerError::Closed)
        ));
    }
}
