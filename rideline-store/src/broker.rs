use rideline_core::{BrokerError, MessageBroker, RetryPolicy};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::memory_broker::InMemoryBroker;

#[derive(Debug, Deserialize, Clone)]
pub struct BrokerSettings {
    /// `memory://` for the in-process exchange, `kafka://host:port[,host:port]`
    /// for a Kafka cluster.
    #[serde(default = "default_uri")]
    pub uri: String,
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    #[serde(default = "default_connect_delay_secs")]
    pub connect_delay_secs: u64,
    #[serde(default = "default_group_id")]
    pub group_id: String,
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
}

fn default_uri() -> String {
    "memory://".into()
}
fn default_connect_attempts() -> u32 {
    30
}
fn default_connect_delay_secs() -> u64 {
    2
}
fn default_group_id() -> String {
    "rideline".into()
}
fn default_topic_prefix() -> String {
    "rideline".into()
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            connect_attempts: default_connect_attempts(),
            connect_delay_secs: default_connect_delay_secs(),
            group_id: default_group_id(),
            topic_prefix: default_topic_prefix(),
        }
    }
}

impl BrokerSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.connect_attempts, Duration::from_secs(self.connect_delay_secs))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum BrokerUri<'a> {
    Memory,
    Kafka(&'a str),
}

fn parse_uri(uri: &str) -> Result<BrokerUri<'_>, BrokerError> {
    match uri.split_once("://") {
        Some(("memory", _)) => Ok(BrokerUri::Memory),
        Some(("kafka", hosts)) if !hosts.is_empty() => Ok(BrokerUri::Kafka(hosts)),
        _ => Err(BrokerError::Connection {
            attempts: 0,
            reason: format!("unsupported broker uri '{}'", uri),
        }),
    }
}

/// Open the configured broker, retrying while it comes up, and declare the
/// trip exchange topology before handing it out.
pub async fn connect(settings: &BrokerSettings) -> Result<Arc<dyn MessageBroker>, BrokerError> {
    let broker: Arc<dyn MessageBroker> = match parse_uri(&settings.uri)? {
        BrokerUri::Memory => {
            info!("Using in-process message broker");
            Arc::new(InMemoryBroker::new())
        }
        BrokerUri::Kafka(hosts) => connect_kafka(hosts, settings).await?,
    };

    broker.declare_topology().await?;
    Ok(broker)
}

#[cfg(feature = "kafka")]
async fn connect_kafka(hosts: &str, settings: &BrokerSettings) -> Result<Arc<dyn MessageBroker>, BrokerError> {
    let broker = crate::kafka_broker::KafkaBroker::connect(hosts, settings).await?;
    Ok(Arc::new(broker))
}

#[cfg(not(feature = "kafka"))]
async fn connect_kafka(hosts: &str, _settings: &BrokerSettings) -> Result<Arc<dyn MessageBroker>, BrokerError> {
    Err(BrokerError::Connection {
        attempts: 0,
        reason: format!("kafka broker at {} requested but the kafka feature is disabled", hosts),
    })
}
