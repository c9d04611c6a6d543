pub mod driver;
pub mod events;
pub mod geo;
pub mod trip;

pub use driver::{Driver, TripDriver};
pub use events::{
    DriverTripResponseData, PaymentSessionCreatedData, PaymentSessionRequestData, TripEventData,
};
pub use geo::{Coordinate, Route};
pub use trip::{PackageClass, RideFare, Trip, TripStatus};
