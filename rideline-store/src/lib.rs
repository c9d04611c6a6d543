pub mod broker;
#[cfg(feature = "kafka")]
pub mod kafka_broker;
pub mod memory_broker;
pub mod memory_repo;
pub mod redis_repo;
pub mod routing;

pub use broker::{connect, BrokerSettings};
#[cfg(feature = "kafka")]
pub use kafka_broker::KafkaBroker;
pub use memory_broker::{InMemoryBroker, PublishedMessage};
pub use memory_repo::InMemoryTripRepository;
pub use redis_repo::RedisTripRepository;
pub use routing::{haversine_metres, OsrmRouteProvider, RouteProviderKind, RoutingSettings, StraightLineRouteProvider};
