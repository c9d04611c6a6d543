use serde::{Deserialize, Serialize};

use super::geo::Coordinate;
use super::trip::PackageClass;

/// A driver currently registered as available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Driver {
    pub id: String,
    pub name: String,
    pub profile_picture: String,
    pub car_plate: String,
    #[serde(rename = "packageSlug")]
    pub package_class: PackageClass,
    pub location: Coordinate,
    /// H3 cell of `location`
    pub geocell: String,
}

/// Copy of driver data held by a trip once assigned. Never a live handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripDriver {
    pub id: String,
    pub name: String,
    pub profile_picture: String,
    pub car_plate: String,
}

impl From<&Driver> for TripDriver {
    fn from(driver: &Driver) -> Self {
        Self {
            id: driver.id.clone(),
            name: driver.name.clone(),
            profile_picture: driver.profile_picture.clone(),
            car_plate: driver.car_plate.clone(),
        }
    }
}
