use futures_util::future::join_all;
use rideline_core::{BrokerError, MessageHandler, QueueWorker};
use rideline_dispatch::{DispatchPolicy, Dispatcher};
use rideline_shared::QueueName;
use rideline_trip::DriverResponseConsumer;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bridge::{SessionBridge, BRIDGED_QUEUES};
use crate::state::AppState;

/// Start one consumer per queue for this process: the dispatcher, the
/// driver-response handler and the session bridge.
pub async fn start_workers(
    state: &AppState,
    policy: DispatchPolicy,
    shutdown: CancellationToken,
) -> Result<Vec<QueueWorker>, BrokerError> {
    let dispatcher: Arc<dyn MessageHandler> =
        Arc::new(Dispatcher::new(state.drivers.clone(), state.broker.clone(), policy));
    let responses: Arc<dyn MessageHandler> = Arc::new(DriverResponseConsumer::new(state.trips.clone()));
    let bridge: Arc<dyn MessageHandler> = Arc::new(SessionBridge::new(state.connections.clone()));

    let mut assignments = vec![
        (QueueName::FindAvailableDrivers, dispatcher),
        (QueueName::DriverTripResponse, responses),
    ];
    assignments.extend(BRIDGED_QUEUES.iter().map(|queue| (*queue, bridge.clone())));

    let mut workers = Vec::with_capacity(assignments.len());
    for (queue, handler) in assignments {
        workers.push(QueueWorker::spawn(state.broker.clone(), queue, handler, shutdown.clone()).await?);
    }
    info!("Started {} queue workers", workers.len());
    Ok(workers)
}

/// Wait for workers to finish their current delivery, up to `timeout`.
pub async fn drain(workers: Vec<QueueWorker>, timeout: Duration) {
    let count = workers.len();
    let joined = join_all(workers.into_iter().map(QueueWorker::join));
    match tokio::time::timeout(timeout, joined).await {
        Ok(_) => info!("Drained {} queue workers", count),
        Err(_) => warn!("Queue workers still busy after {:?}, abandoning them", timeout),
    }
}
