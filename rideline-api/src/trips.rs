use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use rideline_shared::models::{Coordinate, Trip};
use rideline_trip::TripPreview;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;
use crate::DataResponse;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PreviewTripRequest {
    #[serde(rename = "userID")]
    pub user_id: String,
    pub pickup: Coordinate,
    pub destination: Coordinate,
}

#[derive(Debug, Deserialize)]
pub struct StartTripRequest {
    #[serde(rename = "rideFareID")]
    pub ride_fare_id: Uuid,
    #[serde(rename = "userID")]
    pub user_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartTripResponse {
    #[serde(rename = "tripID")]
    pub trip_id: Uuid,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/trip/preview", post(preview_trip))
        .route("/trip/start", post(start_trip))
        .route("/trip/{id}", get(get_trip))
}

/// POST /trip/preview
async fn preview_trip(
    State(state): State<AppState>,
    Json(req): Json<PreviewTripRequest>,
) -> Result<Json<DataResponse<TripPreview>>, AppError> {
    if req.user_id.trim().is_empty() {
        return Err(AppError::ValidationError("userID is required".to_string()));
    }

    let preview = state
        .trips
        .preview_trip(&req.user_id, &req.pickup, &req.destination)
        .await?;
    Ok(Json(DataResponse::new(preview)))
}

/// POST /trip/start
async fn start_trip(
    State(state): State<AppState>,
    Json(req): Json<StartTripRequest>,
) -> Result<Json<DataResponse<StartTripResponse>>, AppError> {
    let trip = state.trips.start_trip(req.ride_fare_id, &req.user_id).await?;
    info!("Trip {} started by {}", trip.id, req.user_id);
    Ok(Json(DataResponse::new(StartTripResponse { trip_id: trip.id })))
}

/// GET /trip/{id}
async fn get_trip(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DataResponse<Trip>>, AppError> {
    let trip = state.trips.get_trip(id).await?;
    Ok(Json(DataResponse::new(trip)))
}
