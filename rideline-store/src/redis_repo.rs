use async_trait::async_trait;
use chrono::Utc;
use redis::AsyncCommands;
use rideline_core::{RepositoryError, TripRepository};
use rideline_shared::models::{RideFare, Trip, TripStatus};
use tracing::{info, warn};
use uuid::Uuid;

fn backend(e: redis::RedisError) -> RepositoryError {
    RepositoryError::Backend(e.to_string())
}

/// Trips and fare quotes stored as JSON documents. Fares expire with their quote.
#[derive(Clone)]
pub struct RedisTripRepository {
    client: redis::Client,
}

impl RedisTripRepository {
    pub fn new(connection_string: &str) -> Result<Self, RepositoryError> {
        let client = redis::Client::open(connection_string).map_err(backend)?;
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, RepositoryError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(backend)
    }
}

fn trip_key(id: Uuid) -> String {
    format!("trip:{}", id)
}

fn fare_key(id: Uuid) -> String {
    format!("fare:{}", id)
}

/// Replace the trip document only while its stored status matches ARGV[1].
/// Returns 1 on write, 0 on a status mismatch and -1 when the key is absent.
const UPDATE_IF_STATUS: &str = r#"
local current = redis.call('GET', KEYS[1])
if not current then
    return -1
end
if cjson.decode(current)['status'] ~= ARGV[1] then
    return 0
end
redis.call('SET', KEYS[1], ARGV[2])
return 1
"#;

/// Seconds until `fare` lapses, never below one so SETEX accepts it.
fn fare_ttl_seconds(fare: &RideFare) -> u64 {
    (fare.expires_at - Utc::now()).num_seconds().max(1) as u64
}

#[async_trait]
impl TripRepository for RedisTripRepository {
    async fn create_trip(&self, trip: &Trip) -> Result<(), RepositoryError> {
        let mut conn = self.connection().await?;
        let body = serde_json::to_string(trip)?;

        // SET NX: refuse to overwrite an existing trip
        let created: Option<String> = redis::cmd("SET")
            .arg(trip_key(trip.id))
            .arg(body)
            .arg("NX")
            .query_async(&mut conn)
            .await
            .map_err(backend)?;

        if created.is_none() {
            return Err(RepositoryError::Duplicate(trip.id));
        }
        info!("Trip stored: {}", trip.id);
        Ok(())
    }

    async fn get_trip(&self, id: Uuid) -> Result<Option<Trip>, RepositoryError> {
        let mut conn = self.connection().await?;
        let body: Option<String> = conn.get(trip_key(id)).await.map_err(backend)?;
        Ok(body.map(|b| serde_json::from_str(&b)).transpose()?)
    }

    async fn update_trip(&self, trip: &Trip, expected: TripStatus) -> Result<(), RepositoryError> {
        let mut conn = self.connection().await?;
        let body = serde_json::to_string(trip)?;

        let written: i64 = redis::Script::new(UPDATE_IF_STATUS)
            .key(trip_key(trip.id))
            .arg(expected.as_str())
            .arg(body)
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;

        if written != 1 {
            warn!("Trip {} update lost: stored status is no longer {}", trip.id, expected);
            return Err(RepositoryError::Conflict { id: trip.id, expected });
        }
        Ok(())
    }

    async fn save_ride_fare(&self, fare: &RideFare) -> Result<(), RepositoryError> {
        let mut conn = self.connection().await?;
        let body = serde_json::to_string(fare)?;
        conn.set_ex::<_, _, ()>(fare_key(fare.id), body, fare_ttl_seconds(fare))
            .await
            .map_err(backend)
    }

    async fn get_ride_fare(&self, id: Uuid) -> Result<Option<RideFare>, RepositoryError> {
        let mut conn = self.connection().await?;
        let body: Option<String> = conn.get(fare_key(id)).await.map_err(backend)?;
        Ok(body.map(|b| serde_json::from_str(&b)).transpose()?)
    }
}
