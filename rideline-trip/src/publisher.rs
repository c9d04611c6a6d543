use rideline_core::{BrokerError, MessageBroker};
use rideline_shared::models::{PaymentSessionRequestData, Trip, TripEventData};
use rideline_shared::{AmqpMessage, RoutingKey};
use std::sync::Arc;
use tracing::info;

/// Publishes trip lifecycle events. Every envelope is owned by the rider.
#[derive(Clone)]
pub struct TripEventPublisher {
    broker: Arc<dyn MessageBroker>,
}

impl TripEventPublisher {
    pub fn new(broker: Arc<dyn MessageBroker>) -> Self {
        Self { broker }
    }

    pub async fn trip_created(&self, trip: &Trip) -> Result<(), BrokerError> {
        self.publish_trip(RoutingKey::TripCreated, trip).await
    }

    pub async fn driver_not_interested(&self, trip: &Trip) -> Result<(), BrokerError> {
        self.publish_trip(RoutingKey::TripDriverNotInterested, trip).await
    }

    pub async fn driver_assigned(&self, trip: &Trip) -> Result<(), BrokerError> {
        self.publish_trip(RoutingKey::TripDriverAssigned, trip).await
    }

    pub async fn payment_session_request(&self, request: &PaymentSessionRequestData) -> Result<(), BrokerError> {
        let message = AmqpMessage::new(request.user_id.clone(), request)?;
        self.broker
            .publish(RoutingKey::PaymentCreateSession, &message)
            .await?;
        info!(
            "Requested payment session for trip {} ({} {})",
            request.trip_id, request.amount, request.currency
        );
        Ok(())
    }

    async fn publish_trip(&self, routing_key: RoutingKey, trip: &Trip) -> Result<(), BrokerError> {
        let message = AmqpMessage::new(trip.user_id.clone(), &TripEventData { trip: trip.clone() })?;
        self.broker.publish(routing_key, &message).await?;
        info!("Published {} for trip {}", routing_key, trip.id);
        Ok(())
    }
}
