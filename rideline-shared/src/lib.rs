pub mod contracts;
pub mod models;

pub use contracts::{AmqpMessage, QueueName, RoutingKey, WsMessage};
