use async_trait::async_trait;
use chrono::Utc;
use rideline_core::{RepositoryError, TripRepository};
use rideline_shared::models::{RideFare, Trip, TripStatus};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Process-local trip and fare store.
#[derive(Default)]
pub struct InMemoryTripRepository {
    trips: RwLock<HashMap<Uuid, Trip>>,
    fares: RwLock<HashMap<Uuid, RideFare>>,
}

impl InMemoryTripRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn trip_count(&self) -> usize {
        self.trips.read().await.len()
    }

    pub async fn fare_count(&self) -> usize {
        self.fares.read().await.len()
    }
}

#[async_trait]
impl TripRepository for InMemoryTripRepository {
    async fn create_trip(&self, trip: &Trip) -> Result<(), RepositoryError> {
        let mut trips = self.trips.write().await;
        if trips.contains_key(&trip.id) {
            return Err(RepositoryError::Duplicate(trip.id));
        }
        trips.insert(trip.id, trip.clone());
        Ok(())
    }

    async fn get_trip(&self, id: Uuid) -> Result<Option<Trip>, RepositoryError> {
        Ok(self.trips.read().await.get(&id).cloned())
    }

    async fn update_trip(&self, trip: &Trip, expected: TripStatus) -> Result<(), RepositoryError> {
        let mut trips = self.trips.write().await;
        match trips.get_mut(&trip.id) {
            Some(stored) if stored.status == expected => {
                *stored = trip.clone();
                Ok(())
            }
            _ => Err(RepositoryError::Conflict { id: trip.id, expected }),
        }
    }

    /// Lapsed quotes are swept on every save, mirroring the TTL the Redis
    /// store puts on them.
    async fn save_ride_fare(&self, fare: &RideFare) -> Result<(), RepositoryError> {
        let now = Utc::now();
        let mut fares = self.fares.write().await;
        fares.retain(|_, quote| !quote.is_expired_at(now));
        fares.insert(fare.id, fare.clone());
        Ok(())
    }

    async fn get_ride_fare(&self, id: Uuid) -> Result<Option<RideFare>, RepositoryError> {
        Ok(self.fares.read().await.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rideline_shared::models::PackageClass;

    fn fare() -> RideFare {
        RideFare::new("rider-1", PackageClass::Sedan, 1200, chrono::Duration::minutes(15), None)
    }

    #[tokio::test]
    async fn test_trip_create_get_save() {
        let repo = InMemoryTripRepository::new();
        let mut trip = Trip::from_fare(fare());

        repo.create_trip(&trip).await.unwrap();
        assert!(matches!(
            repo.create_trip(&trip).await,
            Err(RepositoryError::Duplicate(id)) if id == trip.id
        ));

        trip.update_status(TripStatus::Accepted, None);
        repo.update_trip(&trip, TripStatus::Pending).await.unwrap();

        let stored = repo.get_trip(trip.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TripStatus::Accepted);
        assert_eq!(repo.trip_count().await, 1);
        assert!(repo.get_trip(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_trip_checks_stored_status() {
        let repo = InMemoryTripRepository::new();
        let pending = Trip::from_fare(fare());
        repo.create_trip(&pending).await.unwrap();

        let mut first = pending.clone();
        first.update_status(TripStatus::Accepted, None);
        repo.update_trip(&first, TripStatus::Pending).await.unwrap();

        // A second writer that also read the trip while pending loses.
        let mut second = pending.clone();
        second.update_status(TripStatus::Completed, None);
        assert!(matches!(
            repo.update_trip(&second, TripStatus::Pending).await,
            Err(RepositoryError::Conflict { id, expected: TripStatus::Pending }) if id == pending.id
        ));
        assert_eq!(
            repo.get_trip(pending.id).await.unwrap().unwrap().status,
            TripStatus::Accepted
        );

        let unknown = Trip::from_fare(fare());
        assert!(matches!(
            repo.update_trip(&unknown, TripStatus::Pending).await,
            Err(RepositoryError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_fare_lookup() {
        let repo = InMemoryTripRepository::new();
        let fare = fare();
        repo.save_ride_fare(&fare).await.unwrap();

        assert_eq!(repo.get_ride_fare(fare.id).await.unwrap(), Some(fare));
        assert!(repo.get_ride_fare(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lapsed_fares_are_swept_on_save() {
        let repo = InMemoryTripRepository::new();
        let lapsed = RideFare::new("rider-1", PackageClass::Suv, 800, chrono::Duration::seconds(-1), None);
        repo.save_ride_fare(&lapsed).await.unwrap();
        assert!(repo.get_ride_fare(lapsed.id).await.unwrap().is_some());

        let live = fare();
        repo.save_ride_fare(&live).await.unwrap();
        assert!(repo.get_ride_fare(lapsed.id).await.unwrap().is_none());
        assert_eq!(repo.get_ride_fare(live.id).await.unwrap(), Some(live));
        assert_eq!(repo.fare_count().await, 1);
    }
}
