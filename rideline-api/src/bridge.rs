use async_trait::async_trait;
use rideline_core::MessageHandler;
use rideline_shared::{AmqpMessage, QueueName, RoutingKey, WsMessage};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::connection::{ConnectionManager, SessionError};

/// Queues whose messages are relayed to the owner's live session.
pub const BRIDGED_QUEUES: [QueueName; 4] = [
    QueueName::DriverCmdTripRequest,
    QueueName::NotifyDriverNoDriversFound,
    QueueName::NotifyDriverAssign,
    QueueName::NotifyPaymentSessionCreated,
];

/// Relays broker messages to the session of the envelope owner. Delivery to
/// sessions is best effort: a message for a user without a live session on
/// this process is acknowledged and dropped.
pub struct SessionBridge {
    connections: Arc<ConnectionManager>,
}

impl SessionBridge {
    pub fn new(connections: Arc<ConnectionManager>) -> Self {
        Self { connections }
    }
}

#[async_trait]
impl MessageHandler for SessionBridge {
    async fn handle(&self, routing_key: RoutingKey, message: AmqpMessage) -> anyhow::Result<()> {
        let owner = message.owner_id;
        let frame = WsMessage::new(routing_key, message.data.unwrap_or_default());

        match self.connections.send_message(&owner, frame).await {
            Ok(()) => debug!("Relayed {} to {}", routing_key, owner),
            Err(SessionError::NoSession(_)) => {
                debug!("Dropping {}: no session for {}", routing_key, owner);
            }
            Err(e) => warn!("Dropping {} for {}: {}", routing_key, owner, e),
        }
        Ok(())
    }
}
