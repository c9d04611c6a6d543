use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Name of the single durable topic exchange every message is published on.
pub const TRIP_EXCHANGE: &str = "trip";

/// Messages a consumer may hold unacknowledged at any time.
pub const PREFETCH_COUNT: usize = 1;

// ============================================================================
// Routing keys
// ============================================================================

/// Every event and command type that travels over the broker or a client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoutingKey {
    #[serde(rename = "trip.event.created")]
    TripCreated,
    #[serde(rename = "trip.event.driver_assigned")]
    TripDriverAssigned,
    #[serde(rename = "trip.event.no_drivers_found")]
    TripNoDriversFound,
    #[serde(rename = "trip.event.driver_not_interested")]
    TripDriverNotInterested,
    #[serde(rename = "driver.cmd.trip_request")]
    DriverTripRequest,
    #[serde(rename = "driver.cmd.trip_accept")]
    DriverTripAccept,
    #[serde(rename = "driver.cmd.trip_decline")]
    DriverTripDecline,
    #[serde(rename = "driver.cmd.location")]
    DriverLocation,
    #[serde(rename = "driver.cmd.register")]
    DriverRegister,
    #[serde(rename = "payment.event.session_created")]
    PaymentSessionCreated,
    #[serde(rename = "payment.cmd.create_session")]
    PaymentCreateSession,
}

impl RoutingKey {
    pub const ALL: [RoutingKey; 11] = [
        RoutingKey::TripCreated,
        RoutingKey::TripDriverAssigned,
        RoutingKey::TripNoDriversFound,
        RoutingKey::TripDriverNotInterested,
        RoutingKey::DriverTripRequest,
        RoutingKey::DriverTripAccept,
        RoutingKey::DriverTripDecline,
        RoutingKey::DriverLocation,
        RoutingKey::DriverRegister,
        RoutingKey::PaymentSessionCreated,
        RoutingKey::PaymentCreateSession,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingKey::TripCreated => "trip.event.created",
            RoutingKey::TripDriverAssigned => "trip.event.driver_assigned",
            RoutingKey::TripNoDriversFound => "trip.event.no_drivers_found",
            RoutingKey::TripDriverNotInterested => "trip.event.driver_not_interested",
            RoutingKey::DriverTripRequest => "driver.cmd.trip_request",
            RoutingKey::DriverTripAccept => "driver.cmd.trip_accept",
            RoutingKey::DriverTripDecline => "driver.cmd.trip_decline",
            RoutingKey::DriverLocation => "driver.cmd.location",
            RoutingKey::DriverRegister => "driver.cmd.register",
            RoutingKey::PaymentSessionCreated => "payment.event.session_created",
            RoutingKey::PaymentCreateSession => "payment.cmd.create_session",
        }
    }

    /// Queues the topic exchange delivers a message with this key to.
    /// Empty means the publish is unroutable and will be returned.
    pub fn bound_queues(&self) -> Vec<QueueName> {
        QueueName::ALL
            .into_iter()
            .filter(|queue| queue.bindings().contains(self))
            .collect()
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown routing key: {0}")]
pub struct UnknownRoutingKey(pub String);

impl FromStr for RoutingKey {
    type Err = UnknownRoutingKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RoutingKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| UnknownRoutingKey(s.to_string()))
    }
}

// ============================================================================
// Queues and bindings
// ============================================================================

/// Durable queues declared on startup. The bindings are a closed contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueName {
    FindAvailableDrivers,
    DriverCmdTripRequest,
    DriverTripResponse,
    NotifyDriverNoDriversFound,
    NotifyDriverAssign,
    NotifyPaymentSessionCreated,
}

impl QueueName {
    pub const ALL: [QueueName; 6] = [
        QueueName::FindAvailableDrivers,
        QueueName::DriverCmdTripRequest,
        QueueName::DriverTripResponse,
        QueueName::NotifyDriverNoDriversFound,
        QueueName::NotifyDriverAssign,
        QueueName::NotifyPaymentSessionCreated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::FindAvailableDrivers => "find_available_drivers",
            QueueName::DriverCmdTripRequest => "driver_cmd_trip_request",
            QueueName::DriverTripResponse => "driver_trip_response",
            QueueName::NotifyDriverNoDriversFound => "notify_driver_no_drivers_found",
            QueueName::NotifyDriverAssign => "notify_driver_assign",
            QueueName::NotifyPaymentSessionCreated => "notify_payment_session_created",
        }
    }

    /// Routing keys bound to this queue on the trip exchange.
    pub fn bindings(&self) -> &'static [RoutingKey] {
        match self {
            QueueName::FindAvailableDrivers => &[
                RoutingKey::TripCreated,
                RoutingKey::TripDriverNotInterested,
            ],
            QueueName::DriverCmdTripRequest => &[RoutingKey::DriverTripRequest],
            QueueName::DriverTripResponse => &[
                RoutingKey::DriverTripAccept,
                RoutingKey::DriverTripDecline,
            ],
            QueueName::NotifyDriverNoDriversFound => &[RoutingKey::TripNoDriversFound],
            QueueName::NotifyDriverAssign => &[RoutingKey::TripDriverAssigned],
            QueueName::NotifyPaymentSessionCreated => &[RoutingKey::PaymentSessionCreated],
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Envelopes
// ============================================================================

/// Broker envelope. `owner_id` is the user the message is ultimately for and
/// drives fan-out to live sessions; it is never the routing key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmqpMessage {
    #[serde(rename = "ownerID")]
    pub owner_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl AmqpMessage {
    pub fn new<T: Serialize>(owner_id: impl Into<String>, payload: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            owner_id: owner_id.into(),
            data: Some(serde_json::to_value(payload)?),
        })
    }

    pub fn without_data(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            data: None,
        }
    }

    /// Decode the payload into a typed event. A missing payload decodes as `null`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.clone().unwrap_or(serde_json::Value::Null))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}

/// Frame exchanged with rider and driver clients over their live session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl WsMessage {
    pub fn new(kind: RoutingKey, data: serde_json::Value) -> Self {
        Self {
            kind: kind.as_str().to_string(),
            data,
        }
    }

    pub fn routing_key(&self) -> Result<RoutingKey, UnknownRoutingKey> {
        self.kind.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topology_matches_contract() {
        assert_eq!(
            RoutingKey::TripCreated.bound_queues(),
            vec![QueueName::FindAvailableDrivers]
        );
        assert_eq!(
            RoutingKey::TripDriverNotInterested.bound_queues(),
            vec![QueueName::FindAvailableDrivers]
        );
        assert_eq!(
            RoutingKey::DriverTripAccept.bound_queues(),
            vec![QueueName::DriverTripResponse]
        );
        assert_eq!(
            RoutingKey::DriverTripDecline.bound_queues(),
            vec![QueueName::DriverTripResponse]
        );
        assert_eq!(
            RoutingKey::PaymentSessionCreated.bound_queues(),
            vec![QueueName::NotifyPaymentSessionCreated]
        );
    }

    #[test]
    fn test_client_only_keys_are_unroutable() {
        assert!(RoutingKey::DriverRegister.bound_queues().is_empty());
        assert!(RoutingKey::DriverLocation.bound_queues().is_empty());
        assert!(RoutingKey::PaymentCreateSession.bound_queues().is_empty());
    }

    #[test]
    fn test_routing_key_parsing() {
        assert_eq!(
            "driver.cmd.trip_accept".parse::<RoutingKey>().unwrap(),
            RoutingKey::DriverTripAccept
        );
        assert!("driver.cmd.unknown".parse::<RoutingKey>().is_err());
    }

    #[test]
    fn test_envelope_wire_shape() {
        let msg = AmqpMessage::new("rider-1", &serde_json::json!({"tripID": "t-1"})).unwrap();
        let wire: serde_json::Value = serde_json::from_slice(&msg.to_bytes().unwrap()).unwrap();
        assert_eq!(wire["ownerID"], "rider-1");
        assert_eq!(wire["data"]["tripID"], "t-1");

        let bare = AmqpMessage::without_data("rider-2");
        let wire: serde_json::Value = serde_json::from_slice(&bare.to_bytes().unwrap()).unwrap();
        assert!(wire.get("data").is_none());
    }

    #[test]
    fn test_ws_message_type_field() {
        let frame: WsMessage =
            serde_json::from_str(r#"{"type":"driver.cmd.location","data":{"lat":1}}"#).unwrap();
        assert_eq!(frame.routing_key().unwrap(), RoutingKey::DriverLocation);

        let frame: WsMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(frame.data.is_null());
        assert!(frame.routing_key().is_err());
    }
}
