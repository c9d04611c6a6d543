use rideline_core::{BrokerError, RepositoryError, RouteError};
use rideline_shared::models::TripStatus;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum TripError {
    #[error("Trip not found: {0}")]
    NotFound(Uuid),

    #[error("Ride fare not found: {0}")]
    FareNotFound(Uuid),

    #[error("Ride fare {fare_id} does not belong to user {user_id}")]
    Ownership { fare_id: Uuid, user_id: String },

    #[error("Ride fare {0} has expired")]
    FareExpired(Uuid),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: TripStatus, to: TripStatus },

    #[error("Trip {0} cannot be accepted without a driver")]
    MissingDriver(Uuid),

    #[error("Trip {0} was changed by another update")]
    Conflict(Uuid),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error("Payload encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}
