pub mod consumer;
pub mod error;
pub mod manager;
pub mod pricing;
pub mod publisher;

pub use consumer::DriverResponseConsumer;
pub use error::TripError;
pub use manager::{TripPreview, TripService};
pub use pricing::{BaseFares, FarePricer, PricingConfig};
pub use publisher::TripEventPublisher;
