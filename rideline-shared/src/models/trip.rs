use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::driver::TripDriver;
use super::geo::Route;

/// Vehicle class a fare is quoted for and a driver serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageClass {
    Sedan,
    Suv,
    Van,
    Luxury,
}

impl PackageClass {
    pub const ALL: [PackageClass; 4] = [
        PackageClass::Sedan,
        PackageClass::Suv,
        PackageClass::Van,
        PackageClass::Luxury,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PackageClass::Sedan => "sedan",
            PackageClass::Suv => "suv",
            PackageClass::Van => "van",
            PackageClass::Luxury => "luxury",
        }
    }
}

impl fmt::Display for PackageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown package class: {0}")]
pub struct UnknownPackageClass(pub String);

impl FromStr for PackageClass {
    type Err = UnknownPackageClass;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PackageClass::ALL
            .into_iter()
            .find(|class| class.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownPackageClass(s.to_string()))
    }
}

/// Persisted trip status. "Dispatched" is not stored: it is a pending trip
/// with an offer in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TripStatus {
    Pending,
    Accepted,
    Completed,
}

impl TripStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Pending => "pending",
            TripStatus::Accepted => "accepted",
            TripStatus::Completed => "completed",
        }
    }

    /// Allowed moves of the lifecycle state machine.
    pub fn can_transition_to(&self, next: TripStatus) -> bool {
        matches!(
            (self, next),
            (TripStatus::Pending, TripStatus::Pending)
                | (TripStatus::Pending, TripStatus::Accepted)
                | (TripStatus::Accepted, TripStatus::Pending)
                | (TripStatus::Accepted, TripStatus::Completed)
        )
    }
}

impl fmt::Display for TripStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A priced quote for one package class, owned by the rider who previewed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideFare {
    pub id: Uuid,
    #[serde(rename = "userID")]
    pub user_id: String,
    #[serde(rename = "packageSlug")]
    pub package_class: PackageClass,
    /// Minor currency units
    pub total_price_in_cents: i64,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<Route>,
}

impl RideFare {
    pub fn new(
        user_id: impl Into<String>,
        package_class: PackageClass,
        total_price_in_cents: i64,
        ttl: Duration,
        route: Option<Route>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            package_class,
            total_price_in_cents,
            expires_at: Utc::now() + ttl,
            route,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    pub id: Uuid,
    #[serde(rename = "userID")]
    pub user_id: String,
    pub status: TripStatus,
    pub selected_fare: RideFare,
    #[serde(default)]
    pub driver: Option<TripDriver>,
    #[serde(default)]
    pub route: Option<Route>,
    /// Drivers that turned this trip down, in order
    #[serde(default)]
    pub declined_driver_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trip {
    /// A fresh pending trip for the fare's owner. The fare is copied in.
    pub fn from_fare(fare: RideFare) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: fare.user_id.clone(),
            status: TripStatus::Pending,
            route: fare.route.clone(),
            selected_fare: fare,
            driver: None,
            declined_driver_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn package_class(&self) -> PackageClass {
        self.selected_fare.package_class
    }

    pub fn update_status(&mut self, status: TripStatus, driver: Option<TripDriver>) {
        self.status = status;
        self.driver = driver;
        self.updated_at = Utc::now();
    }

    pub fn record_decline(&mut self, driver_id: &str) {
        if !self.declined_driver_ids.iter().any(|id| id == driver_id) {
            self.declined_driver_ids.push(driver_id.to_string());
        }
    }
}
