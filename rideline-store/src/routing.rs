use async_trait::async_trait;
use reqwest::{Client, Url};
use rideline_core::{RouteError, RouteProvider};
use rideline_shared::models::{Coordinate, Route};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);
const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RouteProviderKind {
    #[default]
    StraightLine,
    Osrm,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RoutingSettings {
    #[serde(default)]
    pub provider: RouteProviderKind,
    #[serde(default = "default_osrm_url")]
    pub osrm_url: String,
    #[serde(default = "default_average_speed_kmh")]
    pub average_speed_kmh: f64,
}

fn default_osrm_url() -> String {
    "http://router.project-osrm.org".into()
}
fn default_average_speed_kmh() -> f64 {
    30.0
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            provider: RouteProviderKind::default(),
            osrm_url: default_osrm_url(),
            average_speed_kmh: default_average_speed_kmh(),
        }
    }
}

impl RoutingSettings {
    pub fn build(&self) -> Result<Arc<dyn RouteProvider>, RouteError> {
        Ok(match self.provider {
            RouteProviderKind::StraightLine => Arc::new(StraightLineRouteProvider::new(self.average_speed_kmh)),
            RouteProviderKind::Osrm => Arc::new(OsrmRouteProvider::new(&self.osrm_url)?),
        })
    }
}

// ============================================================================
// OSRM
// ============================================================================

/// Driving routes from an OSRM `/route` endpoint.
#[derive(Debug, Clone)]
pub struct OsrmRouteProvider {
    client: Client,
    endpoint: String,
}

#[derive(Deserialize)]
struct OsrmRouteResponse {
    code: String,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Deserialize)]
struct OsrmRoute {
    distance: f64,
    duration: f64,
    geometry: OsrmGeometry,
}

#[derive(Deserialize)]
struct OsrmGeometry {
    /// `[longitude, latitude]` pairs
    coordinates: Vec<[f64; 2]>,
}

impl OsrmRouteProvider {
    pub fn new(endpoint: &str) -> Result<Self, RouteError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RouteError::Http(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn route_url(&self, pickup: &Coordinate, destination: &Coordinate) -> Result<Url, RouteError> {
        let base = format!(
            "{}/route/v1/driving/{},{};{},{}",
            self.endpoint, pickup.longitude, pickup.latitude, destination.longitude, destination.latitude
        );
        let mut url = Url::parse(&base).map_err(|e| RouteError::Http(format!("failed to build OSRM URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("overview", "full")
            .append_pair("geometries", "geojson");
        Ok(url)
    }
}

fn parse_route_response(response: OsrmRouteResponse) -> Result<Route, RouteError> {
    if response.code != "Ok" {
        return Err(RouteError::Malformed(format!("OSRM answered {}", response.code)));
    }
    let best = response.routes.into_iter().next().ok_or(RouteError::NoRoute)?;
    Ok(Route {
        coordinates: best
            .geometry
            .coordinates
            .into_iter()
            .map(|[lng, lat]| Coordinate::new(lat, lng))
            .collect(),
        distance: best.distance,
        duration: best.duration,
    })
}

#[async_trait]
impl RouteProvider for OsrmRouteProvider {
    async fn route(&self, pickup: &Coordinate, destination: &Coordinate) -> Result<Route, RouteError> {
        let url = self.route_url(pickup, destination)?;
        debug!("Requesting OSRM route {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RouteError::Http(e.to_string()))?;
        let parsed: OsrmRouteResponse = response
            .json()
            .await
            .map_err(|e| RouteError::Malformed(e.to_string()))?;
        parse_route_response(parsed)
    }
}

// ============================================================================
// Straight line
// ============================================================================

/// Offline fallback: great-circle distance at a constant average speed.
#[derive(Debug, Clone)]
pub struct StraightLineRouteProvider {
    metres_per_second: f64,
}

impl StraightLineRouteProvider {
    pub fn new(average_speed_kmh: f64) -> Self {
        Self {
            metres_per_second: average_speed_kmh.max(1.0) / 3.6,
        }
    }
}

pub fn haversine_metres(a: &Coordinate, b: &Coordinate) -> f64 {
    let (lat1, lat2) = (a.latitude.to_radians(), b.latitude.to_radians());
    let dlat = lat2 - lat1;
    let dlng = (b.longitude - a.longitude).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

#[async_trait]
impl RouteProvider for StraightLineRouteProvider {
    async fn route(&self, pickup: &Coordinate, destination: &Coordinate) -> Result<Route, RouteError> {
        let distance = haversine_metres(pickup, destination);
        Ok(Route {
            coordinates: vec![*pickup, *destination],
            distance,
            duration: distance / self.metres_per_second,
        })
    }
}
