use axum::{
    extract::{Path, Query, State},
    routing::{delete, get},
    Json, Router,
};
use rideline_shared::models::{Driver, PackageClass};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;
use crate::DataResponse;

#[derive(Debug, Deserialize)]
pub struct RegisterDriverRequest {
    #[serde(rename = "driverID")]
    pub driver_id: String,
    #[serde(rename = "packageSlug")]
    pub package_slug: String,
}

#[derive(Debug, Deserialize)]
pub struct DriverFilter {
    #[serde(rename = "packageSlug")]
    pub package_slug: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnregisterDriverResponse {
    pub removed: bool,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/drivers", get(list_drivers).post(register_driver))
        .route("/drivers/{id}", delete(unregister_driver))
}

/// POST /drivers
async fn register_driver(
    State(state): State<AppState>,
    Json(req): Json<RegisterDriverRequest>,
) -> Result<Json<DataResponse<Driver>>, AppError> {
    if req.driver_id.trim().is_empty() {
        return Err(AppError::ValidationError("driverID is required".to_string()));
    }
    let package_class: PackageClass = req.package_slug.parse()?;

    let driver = state.drivers.register(&req.driver_id, package_class).await;
    Ok(Json(DataResponse::new(driver)))
}

/// DELETE /drivers/{id}
async fn unregister_driver(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<DataResponse<UnregisterDriverResponse>> {
    let removed = state.drivers.unregister(&id).await;
    Json(DataResponse::new(UnregisterDriverResponse { removed }))
}

/// GET /drivers?packageSlug=sedan
async fn list_drivers(
    State(state): State<AppState>,
    Query(filter): Query<DriverFilter>,
) -> Result<Json<DataResponse<Vec<Driver>>>, AppError> {
    let package_class = filter
        .package_slug
        .as_deref()
        .map(str::parse::<PackageClass>)
        .transpose()?;

    Ok(Json(DataResponse::new(state.drivers.list(package_class).await)))
}
