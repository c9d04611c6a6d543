use anyhow::{bail, Context};
use async_trait::async_trait;
use rideline_core::MessageHandler;
use rideline_shared::models::DriverTripResponseData;
use rideline_shared::{AmqpMessage, RoutingKey};
use std::sync::Arc;

use crate::manager::TripService;

/// Consumes `driver_trip_response`: accept and decline commands from drivers.
pub struct DriverResponseConsumer {
    trips: Arc<TripService>,
}

impl DriverResponseConsumer {
    pub fn new(trips: Arc<TripService>) -> Self {
        Self { trips }
    }
}

#[async_trait]
impl MessageHandler for DriverResponseConsumer {
    async fn handle(&self, routing_key: RoutingKey, message: AmqpMessage) -> anyhow::Result<()> {
        let response: DriverTripResponseData = message
            .decode()
            .with_context(|| format!("decoding {} from {}", routing_key, message.owner_id))?;

        match routing_key {
            RoutingKey::DriverTripAccept => {
                self.trips
                    .on_driver_accepted(response.trip_id, &response.driver)
                    .await
                    .with_context(|| format!("accepting trip {}", response.trip_id))?;
            }
            RoutingKey::DriverTripDecline => {
                self.trips
                    .on_driver_declined(response.trip_id, &response.driver.id, &response.rider_id)
                    .await
                    .with_context(|| format!("declining trip {}", response.trip_id))?;
            }
            other => bail!("unexpected routing key {} on driver_trip_response", other),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::FarePricer;
    use rideline_core::MessageBroker;
    use rideline_shared::models::{Coordinate, Driver, PackageClass, TripStatus};
    use rideline_store::{InMemoryBroker, InMemoryTripRepository, StraightLineRouteProvider};

    async fn service() -> (Arc<TripService>, InMemoryBroker) {
        let broker = InMemoryBroker::new();
        broker.declare_topology().await.unwrap();
        let service = TripService::new(
            Arc::new(InMemoryTripRepository::new()),
            Arc::new(StraightLineRouteProvider::new(30.0)),
            FarePricer::default(),
            Arc::new(broker.clone()),
        );
        (Arc::new(service), broker)
    }

    fn response(trip_id: uuid::Uuid) -> DriverTripResponseData {
        DriverTripResponseData {
            driver: Driver {
                id: "driver-1".to_string(),
                name: "Ana".to_string(),
                profile_picture: String::new(),
                car_plate: "RL-1".to_string(),
                package_class: PackageClass::Sedan,
                location: Coordinate::new(0.0, 0.0),
                geocell: String::new(),
            },
            trip_id,
            rider_id: "rider-1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_routes_accept_and_decline() {
        let (trips, _broker) = service().await;
        let preview = trips
            .preview_trip("rider-1", &Coordinate::new(0.0, 0.0), &Coordinate::new(0.0, 0.05))
            .await
            .unwrap();
        let trip = trips.start_trip(preview.ride_fares[0].id, "rider-1").await.unwrap();
        let consumer = DriverResponseConsumer::new(trips.clone());

        let accept = AmqpMessage::new("driver-1", &response(trip.id)).unwrap();
        consumer.handle(RoutingKey::DriverTripAccept, accept).await.unwrap();
        assert_eq!(trips.get_trip(trip.id).await.unwrap().status, TripStatus::Accepted);

        let decline = AmqpMessage::new("driver-1", &response(trip.id)).unwrap();
        consumer.handle(RoutingKey::DriverTripDecline, decline).await.unwrap();
        assert_eq!(trips.get_trip(trip.id).await.unwrap().status, TripStatus::Pending);
    }

    #[tokio::test]
    async fn test_failures_surface_as_errors() {
        let (trips, _broker) = service().await;
        let consumer = DriverResponseConsumer::new(trips);

        let unknown_trip = AmqpMessage::new("driver-1", &response(uuid::Uuid::new_v4())).unwrap();
        assert!(consumer.handle(RoutingKey::DriverTripAccept, unknown_trip).await.is_err());

        let garbage = AmqpMessage::without_data("driver-1");
        assert!(consumer.handle(RoutingKey::DriverTripDecline, garbage).await.is_err());

        let wrong_key = AmqpMessage::new("driver-1", &response(uuid::Uuid::new_v4())).unwrap();
        assert!(consumer.handle(RoutingKey::TripCreated, wrong_key).await.is_err());
    }
}
