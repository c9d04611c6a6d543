use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rideline_shared::models::trip::UnknownPackageClass;
use rideline_trip::TripError;
use serde_json::json;

use crate::connection::SessionError;

#[derive(Debug)]
pub enum AppError {
    ValidationError(String),
    OwnershipError(String),
    NotFoundError(String),
    GoneError(String),
    ConflictError(String),
    Anyhow(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::OwnershipError(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::GoneError(msg) => (StatusCode::GONE, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {:#}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<TripError> for AppError {
    fn from(err: TripError) -> Self {
        match err {
            TripError::NotFound(_) | TripError::FareNotFound(_) => AppError::NotFoundError(err.to_string()),
            TripError::Ownership { .. } => AppError::OwnershipError(err.to_string()),
            TripError::FareExpired(_) => AppError::GoneError(err.to_string()),
            TripError::InvalidTransition { .. } | TripError::MissingDriver(_) | TripError::Conflict(_) => {
                AppError::ConflictError(err.to_string())
            }
            other => AppError::Anyhow(other.into()),
        }
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Upgrade(_) => AppError::ValidationError(err.to_string()),
            other => AppError::Anyhow(other.into()),
        }
    }
}

impl From<UnknownPackageClass> for AppError {
    fn from(err: UnknownPackageClass) -> Self {
        AppError::ValidationError(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Anyhow(err)
    }
}
