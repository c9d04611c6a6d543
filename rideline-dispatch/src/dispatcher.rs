use anyhow::{bail, Context};
use async_trait::async_trait;
use rideline_core::{BrokerError, MessageBroker, MessageHandler};
use rideline_shared::models::TripEventData;
use rideline_shared::{AmqpMessage, RoutingKey};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::registry::DriverRegistry;
use crate::selector::{DriverSelector, RandomSelector};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DispatchPolicy {
    /// Skip drivers who already declined the trip when re-dispatching
    #[serde(default)]
    pub exclude_declined_drivers: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Offered { trip_id: Uuid, driver_id: String },
    NoDriversFound { trip_id: Uuid },
}

/// Matches pending trips to available drivers and sends the offer.
pub struct Dispatcher {
    registry: Arc<DriverRegistry>,
    broker: Arc<dyn MessageBroker>,
    selector: Arc<dyn DriverSelector>,
    policy: DispatchPolicy,
}

impl Dispatcher {
    pub fn new(registry: Arc<DriverRegistry>, broker: Arc<dyn MessageBroker>, policy: DispatchPolicy) -> Self {
        Self::with_selector(registry, broker, Arc::new(RandomSelector), policy)
    }

    pub fn with_selector(
        registry: Arc<DriverRegistry>,
        broker: Arc<dyn MessageBroker>,
        selector: Arc<dyn DriverSelector>,
        policy: DispatchPolicy,
    ) -> Self {
        Self {
            registry,
            broker,
            selector,
            policy,
        }
    }

    /// Offer the trip to one matching driver, or tell the rider nobody is available.
    pub async fn dispatch(&self, event: &TripEventData) -> Result<DispatchOutcome, BrokerError> {
        let trip = &event.trip;
        let package_class = trip.package_class();

        let mut candidates = self.registry.find_available(package_class).await;
        if self.policy.exclude_declined_drivers {
            candidates.retain(|id| !trip.declined_driver_ids.contains(id));
        }

        match self.selector.select(&candidates) {
            Some(driver_id) => {
                let message = AmqpMessage::new(driver_id.clone(), event)?;
                self.broker.publish(RoutingKey::DriverTripRequest, &message).await?;
                info!(
                    "Offered trip {} to driver {} ({} {} candidates)",
                    trip.id,
                    driver_id,
                    candidates.len(),
                    package_class
                );
                Ok(DispatchOutcome::Offered {
                    trip_id: trip.id,
                    driver_id,
                })
            }
            None => {
                let message = AmqpMessage::new(trip.user_id.clone(), event)?;
                self.broker.publish(RoutingKey::TripNoDriversFound, &message).await?;
                info!("No {} drivers available for trip {}", package_class, trip.id);
                Ok(DispatchOutcome::NoDriversFound { trip_id: trip.id })
            }
        }
    }
}

#[async_trait]
impl MessageHandler for Dispatcher {
    async fn handle(&self, routing_key: RoutingKey, message: AmqpMessage) -> anyhow::Result<()> {
        match routing_key {
            RoutingKey::TripCreated | RoutingKey::TripDriverNotInterested => {
                let event: TripEventData = message
                    .decode()
                    .with_context(|| format!("decoding {} for {}", routing_key, message.owner_id))?;
                self.dispatch(&event)
                    .await
                    .with_context(|| format!("dispatching trip {}", event.trip.id))?;
                Ok(())
            }
            other => bail!("unexpected routing key {} on find_available_drivers", other),
        }
    }
}
