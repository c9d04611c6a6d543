use rideline_core::MessageBroker;
use rideline_dispatch::DriverRegistry;
use rideline_trip::{FarePricer, TripService};
use std::sync::Arc;

use crate::app_config::Config;
use crate::connection::ConnectionManager;

#[derive(Clone)]
pub struct AppState {
    pub trips: Arc<TripService>,
    pub drivers: Arc<DriverRegistry>,
    pub connections: Arc<ConnectionManager>,
    pub broker: Arc<dyn MessageBroker>,
}

impl AppState {
    /// Wire the services from configuration around an already connected broker.
    pub fn from_config(config: &Config, broker: Arc<dyn MessageBroker>) -> anyhow::Result<Self> {
        let repository = config.store.build()?;
        let routes = config.routing.build()?;
        let trips = TripService::new(
            repository,
            routes,
            FarePricer::new(config.pricing.clone()),
            broker.clone(),
        );

        Ok(Self {
            trips: Arc::new(trips),
            drivers: Arc::new(DriverRegistry::new()),
            connections: Arc::new(ConnectionManager::new(config.sessions.outbound_buffer)),
            broker,
        })
    }
}
