use async_trait::async_trait;
use rideline_shared::models::{RideFare, Trip, TripStatus};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Record already exists: {0}")]
    Duplicate(Uuid),

    #[error("Trip {id} is no longer {expected}")]
    Conflict { id: Uuid, expected: TripStatus },

    #[error("Stored record is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Key-value store for trips and fare quotes.
#[async_trait]
pub trait TripRepository: Send + Sync {
    async fn create_trip(&self, trip: &Trip) -> Result<(), RepositoryError>;

    async fn get_trip(&self, id: Uuid) -> Result<Option<Trip>, RepositoryError>;

    /// Overwrite the stored trip, but only while its stored status is still
    /// `expected`. Fails with `Conflict` when another writer got there first.
    async fn update_trip(&self, trip: &Trip, expected: TripStatus) -> Result<(), RepositoryError>;

    async fn save_ride_fare(&self, fare: &RideFare) -> Result<(), RepositoryError>;

    async fn get_ride_fare(&self, id: Uuid) -> Result<Option<RideFare>, RepositoryError>;
}
