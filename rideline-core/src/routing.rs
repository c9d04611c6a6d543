use async_trait::async_trait;
use rideline_shared::models::{Coordinate, Route};

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("Routing request failed: {0}")]
    Http(String),

    #[error("No route between the given points")]
    NoRoute,

    #[error("Malformed routing response: {0}")]
    Malformed(String),
}

/// Supplies the polyline, distance and duration between two points.
#[async_trait]
pub trait RouteProvider: Send + Sync {
    async fn route(&self, pickup: &Coordinate, destination: &Coordinate) -> Result<Route, RouteError>;
}
