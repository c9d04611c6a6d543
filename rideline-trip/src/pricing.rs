use chrono::Duration;
use rideline_shared::models::{PackageClass, RideFare, Route};
use serde::{Deserialize, Serialize};

/// Flat starting price per package class, in cents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseFares {
    #[serde(default = "default_sedan")]
    pub sedan: i64,
    #[serde(default = "default_suv")]
    pub suv: i64,
    #[serde(default = "default_van")]
    pub van: i64,
    #[serde(default = "default_luxury")]
    pub luxury: i64,
}

fn default_sedan() -> i64 { 350 }
fn default_suv() -> i64 { 400 }
fn default_van() -> i64 { 400 }
fn default_luxury() -> i64 { 1000 }

impl Default for BaseFares {
    fn default() -> Self {
        Self {
            sedan: default_sedan(),
            suv: default_suv(),
            van: default_van(),
            luxury: default_luxury(),
        }
    }
}

impl BaseFares {
    pub fn for_class(&self, class: PackageClass) -> i64 {
        match class {
            PackageClass::Sedan => self.sedan,
            PackageClass::Suv => self.suv,
            PackageClass::Van => self.van,
            PackageClass::Luxury => self.luxury,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    #[serde(default)]
    pub base_fares: BaseFares,

    #[serde(default = "default_price_per_km_cents")]
    pub price_per_km_cents: i64,

    #[serde(default = "default_price_per_minute_cents")]
    pub price_per_minute_cents: i64,

    /// How long a previewed fare can be used to start a trip
    #[serde(default = "default_fare_ttl_seconds")]
    pub fare_ttl_seconds: u64,

    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_price_per_km_cents() -> i64 { 150 }
fn default_price_per_minute_cents() -> i64 { 25 }
fn default_fare_ttl_seconds() -> u64 { 900 }
fn default_currency() -> String { "usd".into() }

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            base_fares: BaseFares::default(),
            price_per_km_cents: default_price_per_km_cents(),
            price_per_minute_cents: default_price_per_minute_cents(),
            fare_ttl_seconds: default_fare_ttl_seconds(),
            currency: default_currency(),
        }
    }
}

/// Distance and time based fare calculator
#[derive(Debug, Clone, Default)]
pub struct FarePricer {
    config: PricingConfig,
}

impl FarePricer {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    pub fn fare_ttl(&self) -> Duration {
        Duration::seconds(self.config.fare_ttl_seconds as i64)
    }

    /// Total in cents: base + per-km + per-minute, each component rounded to
    /// the nearest cent. Route metres and seconds are rounded to integers first.
    pub fn estimate(&self, class: PackageClass, route: &Route) -> i64 {
        let metres = route.distance.max(0.0).round() as i64;
        let seconds = route.duration.max(0.0).round() as i64;

        let distance_cents = (metres * self.config.price_per_km_cents + 500) / 1000;
        let time_cents = (seconds * self.config.price_per_minute_cents + 30) / 60;

        self.config.base_fares.for_class(class) + distance_cents + time_cents
    }

    /// One fresh quote per package class for `user_id`, in class order.
    pub fn quote_all(&self, user_id: &str, route: &Route) -> Vec<RideFare> {
        PackageClass::ALL
            .into_iter()
            .map(|class| {
                RideFare::new(
                    user_id,
                    class,
                    self.estimate(class, route),
                    self.fare_ttl(),
                    Some(route.clone()),
                )
            })
            .collect()
    }
}
