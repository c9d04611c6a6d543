use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::driver::Driver;
use super::trip::Trip;

/// Payload of `trip.event.created`, `trip.event.driver_not_interested`,
/// `trip.event.driver_assigned`, `trip.event.no_drivers_found` and
/// `driver.cmd.trip_request`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripEventData {
    pub trip: Trip,
}

/// Payload a driver sends with `driver.cmd.trip_accept` / `driver.cmd.trip_decline`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverTripResponseData {
    pub driver: Driver,
    #[serde(rename = "tripID")]
    pub trip_id: Uuid,
    #[serde(rename = "riderID")]
    pub rider_id: String,
}

/// Payload of `payment.cmd.create_session`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSessionRequestData {
    #[serde(rename = "tripID")]
    pub trip_id: Uuid,
    #[serde(rename = "userID")]
    pub user_id: String,
    #[serde(rename = "driverID")]
    pub driver_id: String,
    /// Minor currency units
    pub amount: i64,
    pub currency: String,
}

/// Payload of `payment.event.session_created`, produced by the payment service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSessionCreatedData {
    #[serde(rename = "tripID")]
    pub trip_id: Uuid,
    #[serde(rename = "sessionID")]
    pub session_id: String,
    pub amount: i64,
    pub currency: String,
}
