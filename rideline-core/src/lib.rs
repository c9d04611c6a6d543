pub mod broker;
pub mod consumer;
pub mod repository;
pub mod retry;
pub mod routing;

pub use broker::{BrokerError, Delivery, MessageBroker, Settlement};
pub use consumer::{MessageHandler, QueueWorker};
pub use repository::{RepositoryError, TripRepository};
pub use retry::RetryPolicy;
pub use routing::{RouteError, RouteProvider};
