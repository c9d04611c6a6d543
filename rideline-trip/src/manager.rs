use chrono::Utc;
use rideline_core::{MessageBroker, RepositoryError, RouteProvider, TripRepository};
use rideline_shared::models::{
    Coordinate, Driver, PaymentSessionRequestData, RideFare, Route, Trip, TripDriver, TripStatus,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::TripError;
use crate::pricing::FarePricer;
use crate::publisher::TripEventPublisher;

/// Route plus one fare candidate per package class.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TripPreview {
    pub route: Route,
    pub ride_fares: Vec<RideFare>,
}

/// Owns trip and fare state and drives the trip lifecycle.
pub struct TripService {
    repository: Arc<dyn TripRepository>,
    routes: Arc<dyn RouteProvider>,
    pricer: FarePricer,
    events: TripEventPublisher,
}

impl TripService {
    pub fn new(
        repository: Arc<dyn TripRepository>,
        routes: Arc<dyn RouteProvider>,
        pricer: FarePricer,
        broker: Arc<dyn MessageBroker>,
    ) -> Self {
        Self {
            repository,
            routes,
            pricer,
            events: TripEventPublisher::new(broker),
        }
    }

    // ========================================================================
    // Rider operations
    // ========================================================================

    /// Price every package class for the route between two points. The quotes
    /// are stored so a later `start_trip` can reference one by id.
    pub async fn preview_trip(
        &self,
        user_id: &str,
        pickup: &Coordinate,
        destination: &Coordinate,
    ) -> Result<TripPreview, TripError> {
        let route = self.routes.route(pickup, destination).await?;
        let ride_fares = self.pricer.quote_all(user_id, &route);

        for fare in &ride_fares {
            self.repository.save_ride_fare(fare).await?;
        }

        info!(
            "Previewed trip for {}: {:.0} m, {:.0} s, {} fares",
            user_id,
            route.distance,
            route.duration,
            ride_fares.len()
        );
        Ok(TripPreview { route, ride_fares })
    }

    /// Look up a quote and check that `user_id` may still use it.
    pub async fn get_and_validate_fare(&self, fare_id: Uuid, user_id: &str) -> Result<RideFare, TripError> {
        let fare = self
            .repository
            .get_ride_fare(fare_id)
            .await?
            .ok_or(TripError::FareNotFound(fare_id))?;

        if !fare.is_owned_by(user_id) {
            return Err(TripError::Ownership {
                fare_id,
                user_id: user_id.to_string(),
            });
        }
        if fare.is_expired_at(Utc::now()) {
            return Err(TripError::FareExpired(fare_id));
        }
        Ok(fare)
    }

    /// Persist a new pending trip for an already validated fare and announce it.
    pub async fn create_trip(&self, fare: RideFare) -> Result<Trip, TripError> {
        let trip = Trip::from_fare(fare);
        self.repository.create_trip(&trip).await?;
        info!(
            "Created trip {} for {} ({})",
            trip.id,
            trip.user_id,
            trip.package_class()
        );

        self.events.trip_created(&trip).await?;
        Ok(trip)
    }

    pub async fn start_trip(&self, fare_id: Uuid, user_id: &str) -> Result<Trip, TripError> {
        let fare = self.get_and_validate_fare(fare_id, user_id).await?;
        self.create_trip(fare).await
    }

    pub async fn get_trip(&self, trip_id: Uuid) -> Result<Trip, TripError> {
        self.repository
            .get_trip(trip_id)
            .await?
            .ok_or(TripError::NotFound(trip_id))
    }

    // ========================================================================
    // State machine
    // ========================================================================

    /// Move a trip to `status`. Accepting stores the driver snapshot, going
    /// back to pending clears it.
    pub async fn update_trip(
        &self,
        trip_id: Uuid,
        status: TripStatus,
        driver: Option<TripDriver>,
    ) -> Result<Trip, TripError> {
        self.modify_trip(trip_id, |trip| apply_transition(trip, status, driver))
            .await
    }

    /// Read, change and write back a trip. The write only lands if the stored
    /// status is still the one read, so two concurrent responses to the same
    /// offer cannot both win.
    async fn modify_trip<F>(&self, trip_id: Uuid, change: F) -> Result<Trip, TripError>
    where
        F: FnOnce(&mut Trip) -> Result<(), TripError>,
    {
        let mut trip = self.get_trip(trip_id).await?;
        let read_status = trip.status;
        change(&mut trip)?;

        self.repository
            .update_trip(&trip, read_status)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict { id, .. } => TripError::Conflict(id),
                other => other.into(),
            })?;
        info!("Trip {} is now {}", trip.id, trip.status);
        Ok(trip)
    }

    // ========================================================================
    // Driver responses
    // ========================================================================

    /// Assign `driver`, then tell the rider and request a payment session.
    /// The accepted status stays even if a publish fails.
    pub async fn on_driver_accepted(&self, trip_id: Uuid, driver: &Driver) -> Result<Trip, TripError> {
        self.get_trip(trip_id).await?;
        self.update_trip(trip_id, TripStatus::Accepted, Some(TripDriver::from(driver)))
            .await?;

        let trip = self.get_trip(trip_id).await?;
        self.events.driver_assigned(&trip).await?;

        let assigned = trip.driver.as_ref().ok_or(TripError::MissingDriver(trip_id))?;
        let request = PaymentSessionRequestData {
            trip_id: trip.id,
            user_id: trip.user_id.clone(),
            driver_id: assigned.id.clone(),
            amount: trip.selected_fare.total_price_in_cents,
            currency: self.pricer.config().currency.clone(),
        };
        self.events.payment_session_request(&request).await?;

        info!("Driver {} accepted trip {}", driver.id, trip_id);
        Ok(trip)
    }

    /// Put the trip back to pending and hand it to dispatch again.
    pub async fn on_driver_declined(
        &self,
        trip_id: Uuid,
        driver_id: &str,
        rider_id: &str,
    ) -> Result<Trip, TripError> {
        let trip = self
            .modify_trip(trip_id, |trip| {
                if trip.status != TripStatus::Pending {
                    apply_transition(trip, TripStatus::Pending, None)?;
                }
                trip.record_decline(driver_id);
                Ok(())
            })
            .await?;
        if trip.user_id != rider_id {
            warn!(
                "Decline for trip {} names rider {} but the trip belongs to {}",
                trip_id, rider_id, trip.user_id
            );
        }

        info!("Driver {} declined trip {}, re-dispatching", driver_id, trip_id);
        self.events.driver_not_interested(&trip).await?;
        Ok(trip)
    }
}

fn apply_transition(trip: &mut Trip, status: TripStatus, driver: Option<TripDriver>) -> Result<(), TripError> {
    if !trip.status.can_transition_to(status) {
        return Err(TripError::InvalidTransition {
            from: trip.status,
            to: status,
        });
    }

    let driver = match status {
        TripStatus::Accepted => Some(driver.ok_or(TripError::MissingDriver(trip.id))?),
        TripStatus::Pending => None,
        TripStatus::Completed => driver.or_else(|| trip.driver.clone()),
    };
    trip.update_status(status, driver);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rideline_shared::models::{PackageClass, PaymentSessionRequestData, TripEventData};
    use rideline_shared::RoutingKey;
    use rideline_store::{InMemoryBroker, InMemoryTripRepository, StraightLineRouteProvider};

    struct Fixture {
        service: TripService,
        broker: InMemoryBroker,
        repository: Arc<InMemoryTripRepository>,
    }

    async fn fixture() -> Fixture {
        let broker = InMemoryBroker::new();
        broker.declare_topology().await.unwrap();
        let repository = Arc::new(InMemoryTripRepository::new());
        let service = TripService::new(
            repository.clone(),
            Arc::new(StraightLineRouteProvider::new(30.0)),
            FarePricer::default(),
            Arc::new(broker.clone()),
        );
        Fixture {
            service,
            broker,
            repository,
        }
    }

    fn pickup() -> Coordinate {
        Coordinate::new(52.5163, 13.3777)
    }

    fn destination() -> Coordinate {
        Coordinate::new(52.5219, 13.4132)
    }

    fn driver(id: &str) -> Driver {
        Driver {
            id: id.to_string(),
            name: "Lando Norris".to_string(),
            profile_picture: "https://randomuser.me/api/portraits/lego/1.jpg".to_string(),
            car_plate: "B-RL-1042".to_string(),
            package_class: PackageClass::Sedan,
            location: pickup(),
            geocell: "891f1d48177ffff".to_string(),
        }
    }

    async fn sedan_trip(f: &Fixture) -> Trip {
        let preview = f.service.preview_trip("rider-1", &pickup(), &destination()).await.unwrap();
        let sedan = preview
            .ride_fares
            .iter()
            .find(|fare| fare.package_class == PackageClass::Sedan)
            .unwrap();
        f.service.start_trip(sedan.id, "rider-1").await.unwrap()
    }

    #[tokio::test]
    async fn test_preview_quotes_every_class() {
        let f = fixture().await;
        let preview = f.service.preview_trip("rider-1", &pickup(), &destination()).await.unwrap();

        assert_eq!(preview.ride_fares.len(), 4);
        assert!(preview.route.distance > 0.0);
        for fare in &preview.ride_fares {
            let stored = f.service.get_and_validate_fare(fare.id, "rider-1").await.unwrap();
            assert_eq!(&stored, fare);
        }
        assert!(f.broker.published().is_empty());
    }

    #[tokio::test]
    async fn test_start_trip_publishes_created_once() {
        let f = fixture().await;
        let trip = sedan_trip(&f).await;

        assert_eq!(trip.status, TripStatus::Pending);
        assert!(trip.driver.is_none());
        assert_eq!(f.repository.trip_count().await, 1);

        let created = f.broker.published_with(RoutingKey::TripCreated);
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].message.owner_id, "rider-1");
        let event: TripEventData = created[0].message.decode().unwrap();
        assert_eq!(event.trip.id, trip.id);
        assert_eq!(event.trip.selected_fare.package_class, PackageClass::Sedan);
    }

    #[tokio::test]
    async fn test_fare_validation() {
        let f = fixture().await;
        let preview = f.service.preview_trip("rider-1", &pickup(), &destination()).await.unwrap();
        let fare_id = preview.ride_fares[0].id;

        assert!(matches!(
            f.service.start_trip(fare_id, "rider-2").await,
            Err(TripError::Ownership { .. })
        ));
        assert!(matches!(
            f.service.start_trip(Uuid::new_v4(), "rider-1").await,
            Err(TripError::FareNotFound(_))
        ));

        let stale = RideFare::new("rider-1", PackageClass::Van, 500, chrono::Duration::seconds(-1), None);
        f.repository.save_ride_fare(&stale).await.unwrap();
        assert!(matches!(
            f.service.start_trip(stale.id, "rider-1").await,
            Err(TripError::FareExpired(id)) if id == stale.id
        ));
        assert!(f.broker.published_with(RoutingKey::TripCreated).is_empty());
    }

    #[tokio::test]
    async fn test_accept_assigns_and_requests_payment() {
        let f = fixture().await;
        let trip = sedan_trip(&f).await;

        let accepted = f.service.on_driver_accepted(trip.id, &driver("driver-1")).await.unwrap();
        assert_eq!(accepted.status, TripStatus::Accepted);
        assert_eq!(accepted.driver.as_ref().unwrap().id, "driver-1");

        let assigned = f.broker.published_with(RoutingKey::TripDriverAssigned);
        assert_eq!(assigned.len(), 1);
        assert_eq!(assigned[0].message.owner_id, "rider-1");

        let payment = f.broker.published_with(RoutingKey::PaymentCreateSession);
        assert_eq!(payment.len(), 1);
        let request: PaymentSessionRequestData = payment[0].message.decode().unwrap();
        assert_eq!(request.trip_id, trip.id);
        assert_eq!(request.user_id, "rider-1");
        assert_eq!(request.driver_id, "driver-1");
        assert_eq!(request.amount, trip.selected_fare.total_price_in_cents);
        assert_eq!(request.currency, "usd");
        // Nothing consumes payment commands in this topology.
        assert!(payment[0].routed_to.is_empty());
    }

    #[tokio::test]
    async fn test_second_accept_is_rejected() {
        let f = fixture().await;
        let trip = sedan_trip(&f).await;
        f.service.on_driver_accepted(trip.id, &driver("driver-1")).await.unwrap();

        assert!(matches!(
            f.service.on_driver_accepted(trip.id, &driver("driver-2")).await,
            Err(TripError::InvalidTransition {
                from: TripStatus::Accepted,
                to: TripStatus::Accepted
            })
        ));
        let stored = f.service.get_trip(trip.id).await.unwrap();
        assert_eq!(stored.driver.unwrap().id, "driver-1");
    }

    #[tokio::test]
    async fn test_decline_reverts_and_redispatches() {
        let f = fixture().await;
        let trip = sedan_trip(&f).await;
        f.service.on_driver_accepted(trip.id, &driver("driver-1")).await.unwrap();

        let declined = f.service.on_driver_declined(trip.id, "driver-1", "rider-1").await.unwrap();
        assert_eq!(declined.status, TripStatus::Pending);
        assert!(declined.driver.is_none());
        assert_eq!(declined.declined_driver_ids, vec!["driver-1".to_string()]);

        let redispatch = f.broker.published_with(RoutingKey::TripDriverNotInterested);
        assert_eq!(redispatch.len(), 1);
        assert_eq!(redispatch[0].message.owner_id, "rider-1");
        let event: TripEventData = redispatch[0].message.decode().unwrap();
        assert_eq!(event.trip.status, TripStatus::Pending);
    }

    #[tokio::test]
    async fn test_decline_on_pending_trip_keeps_pending() {
        let f = fixture().await;
        let trip = sedan_trip(&f).await;

        let declined = f.service.on_driver_declined(trip.id, "driver-3", "rider-1").await.unwrap();
        assert_eq!(declined.status, TripStatus::Pending);
        assert_eq!(f.broker.published_with(RoutingKey::TripDriverNotInterested).len(), 1);
    }

    /// Applies a rival write right after the next trip read, so the caller
    /// holds a stale snapshot when it writes back.
    struct InterleavedRepository {
        inner: InMemoryTripRepository,
        rival: std::sync::Mutex<Option<Trip>>,
    }

    #[async_trait::async_trait]
    impl TripRepository for InterleavedRepository {
        async fn create_trip(&self, trip: &Trip) -> Result<(), RepositoryError> {
            self.inner.create_trip(trip).await
        }

        async fn get_trip(&self, id: Uuid) -> Result<Option<Trip>, RepositoryError> {
            let snapshot = self.inner.get_trip(id).await?;
            let rival = self.rival.lock().unwrap().take();
            if let Some(rival) = rival {
                self.inner.update_trip(&rival, TripStatus::Pending).await?;
            }
            Ok(snapshot)
        }

        async fn update_trip(&self, trip: &Trip, expected: TripStatus) -> Result<(), RepositoryError> {
            self.inner.update_trip(trip, expected).await
        }

        async fn save_ride_fare(&self, fare: &RideFare) -> Result<(), RepositoryError> {
            self.inner.save_ride_fare(fare).await
        }

        async fn get_ride_fare(&self, id: Uuid) -> Result<Option<RideFare>, RepositoryError> {
            self.inner.get_ride_fare(id).await
        }
    }

    #[tokio::test]
    async fn test_stale_decline_loses_to_concurrent_accept() {
        let broker = InMemoryBroker::new();
        broker.declare_topology().await.unwrap();
        let repository = Arc::new(InterleavedRepository {
            inner: InMemoryTripRepository::new(),
            rival: std::sync::Mutex::new(None),
        });
        let service = TripService::new(
            repository.clone(),
            Arc::new(StraightLineRouteProvider::new(30.0)),
            FarePricer::default(),
            Arc::new(broker.clone()),
        );

        let fare = RideFare::new("rider-1", PackageClass::Sedan, 1200, chrono::Duration::minutes(15), None);
        let trip = service.create_trip(fare).await.unwrap();

        let mut accepted = trip.clone();
        accepted.update_status(TripStatus::Accepted, Some(TripDriver::from(&driver("driver-2"))));
        *repository.rival.lock().unwrap() = Some(accepted);

        assert!(matches!(
            service.on_driver_declined(trip.id, "driver-1", "rider-1").await,
            Err(TripError::Conflict(id)) if id == trip.id
        ));

        let stored = service.get_trip(trip.id).await.unwrap();
        assert_eq!(stored.status, TripStatus::Accepted);
        assert_eq!(stored.driver.unwrap().id, "driver-2");
        assert!(stored.declined_driver_ids.is_empty());
        assert!(broker.published_with(RoutingKey::TripDriverNotInterested).is_empty());
    }

    #[tokio::test]
    async fn test_update_trip_guards() {
        let f = fixture().await;
        let trip = sedan_trip(&f).await;

        assert!(matches!(
            f.service.update_trip(Uuid::new_v4(), TripStatus::Pending, None).await,
            Err(TripError::NotFound(_))
        ));
        assert!(matches!(
            f.service.update_trip(trip.id, TripStatus::Accepted, None).await,
            Err(TripError::MissingDriver(_))
        ));
        assert!(matches!(
            f.service.update_trip(trip.id, TripStatus::Completed, None).await,
            Err(TripError::InvalidTransition { .. })
        ));

        f.service
            .update_trip(trip.id, TripStatus::Accepted, Some(TripDriver::from(&driver("driver-1"))))
            .await
            .unwrap();
        let completed = f.service.update_trip(trip.id, TripStatus::Completed, None).await.unwrap();
        assert_eq!(completed.status, TripStatus::Completed);
        assert_eq!(completed.driver.unwrap().id, "driver-1");
    }
}
