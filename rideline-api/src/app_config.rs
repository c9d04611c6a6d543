use rideline_core::{RepositoryError, TripRepository};
use rideline_dispatch::DispatchPolicy;
use rideline_store::{BrokerSettings, InMemoryTripRepository, RedisTripRepository, RoutingSettings};
use rideline_trip::PricingConfig;
use serde::Deserialize;
use std::env;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub broker: BrokerSettings,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub routing: RoutingSettings,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub dispatch: DispatchPolicy,
    #[serde(default)]
    pub sessions: SessionConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 { 8081 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: default_port() }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
}

fn default_redis_url() -> String { "redis://127.0.0.1:6379".into() }

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            redis_url: default_redis_url(),
        }
    }
}

impl StoreConfig {
    pub fn build(&self) -> Result<Arc<dyn TripRepository>, RepositoryError> {
        Ok(match self.backend {
            StoreBackend::Memory => Arc::new(InMemoryTripRepository::new()),
            StoreBackend::Redis => Arc::new(RedisTripRepository::new(&self.redis_url)?),
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    /// Frames queued per session before new ones are dropped
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

fn default_outbound_buffer() -> usize { 64 }

impl Default for SessionConfig {
    fn default() -> Self {
        Self { outbound_buffer: default_outbound_buffer() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ShutdownConfig {
    #[serde(default = "default_drain_seconds")]
    pub drain_seconds: u64,
}

fn default_drain_seconds() -> u64 { 10 }

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { drain_seconds: default_drain_seconds() }
    }
}

impl ShutdownConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_seconds)
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `RIDELINE__BROKER__URI=kafka://localhost:9092`
            .add_source(config::Environment::with_prefix("RIDELINE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
