//! Rider and driver WebSocket sessions.
//!
//! Each socket gets one task that pumps client frames in and queued session
//! frames out. Broker events reach the socket through the [`ConnectionManager`]
//! channel, never by writing to the socket directly.
//!
//! [`ConnectionManager`]: crate::connection::ConnectionManager

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use rideline_shared::models::PackageClass;
use rideline_shared::{AmqpMessage, RoutingKey, WsMessage};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::connection::{SessionError, SessionHandle};
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RiderParams {
    #[serde(rename = "userID", default)]
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct DriverParams {
    #[serde(rename = "userID", default)]
    pub user_id: String,
    #[serde(rename = "packageSlug", default)]
    pub package_slug: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Rider,
    Driver,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/ws/riders", get(riders_ws))
        .route("/ws/drivers", get(drivers_ws))
}

fn require_user(user_id: &str) -> Result<(), AppError> {
    if user_id.trim().is_empty() {
        return Err(AppError::ValidationError("userID query parameter is required".to_string()));
    }
    Ok(())
}

fn upgrade(ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>) -> Result<WebSocketUpgrade, AppError> {
    ws.map_err(|rejection| {
        let err = SessionError::Upgrade(rejection.body_text());
        warn!("{}", err);
        err.into()
    })
}

/// GET /ws/riders?userID=
async fn riders_ws(
    State(state): State<AppState>,
    Query(params): Query<RiderParams>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, AppError> {
    require_user(&params.user_id)?;
    let ws = upgrade(ws)?;

    Ok(ws
        .on_upgrade(move |socket| async move {
            let mut handle = state.connections.add(&params.user_id).await;
            pump(socket, &state, &mut handle, Role::Rider).await;
            state.connections.release(&handle).await;
        })
        .into_response())
}

/// GET /ws/drivers?userID=&packageSlug=
async fn drivers_ws(
    State(state): State<AppState>,
    Query(params): Query<DriverParams>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, AppError> {
    require_user(&params.user_id)?;
    if params.package_slug.trim().is_empty() {
        return Err(AppError::ValidationError("packageSlug query parameter is required".to_string()));
    }
    let package_class: PackageClass = params.package_slug.parse()?;
    let ws = upgrade(ws)?;

    Ok(ws
        .on_upgrade(move |socket| async move {
            match driver_connected(&state, &params.user_id, package_class).await {
                Ok(mut handle) => {
                    pump(socket, &state, &mut handle, Role::Driver).await;
                    driver_disconnected(&state, &handle).await;
                }
                Err(e) => error!("Driver session for {} failed to start: {}", params.user_id, e),
            }
        })
        .into_response())
}

// ============================================================================
// Driver session lifecycle
// ============================================================================

/// Open the session, make the driver available, and send them their profile.
pub async fn driver_connected(
    state: &AppState,
    user_id: &str,
    package_class: PackageClass,
) -> Result<SessionHandle, SessionError> {
    let handle = state.connections.add(user_id).await;
    let driver = state.drivers.register(user_id, package_class).await;

    let greeted = match serde_json::to_value(&driver) {
        Ok(profile) => {
            let frame = WsMessage::new(RoutingKey::DriverRegister, profile);
            state.connections.send_message(user_id, frame).await
        }
        Err(e) => Err(e.into()),
    };
    settle_driver_start(state, handle, greeted).await
}

/// Hand back the session if the greeting went out. Otherwise tear it down
/// through the same gate as a disconnect, so a failed start never withdraws
/// a newer session for the same driver.
async fn settle_driver_start(
    state: &AppState,
    handle: SessionHandle,
    greeted: Result<(), SessionError>,
) -> Result<SessionHandle, SessionError> {
    match greeted {
        Ok(()) => Ok(handle),
        Err(e) => {
            driver_disconnected(state, &handle).await;
            Err(e)
        }
    }
}

/// Close the session and withdraw the driver, unless a newer session for the
/// same driver has taken over.
pub async fn driver_disconnected(state: &AppState, handle: &SessionHandle) {
    if state.connections.release(handle).await {
        state.drivers.unregister(&handle.user_id).await;
    } else {
        debug!("Driver {} reconnected, keeping registration", handle.user_id);
    }
}

/// Handle one frame sent by a driver. Trip responses are forwarded to the
/// broker with the driver as owner; location updates are accepted and ignored.
pub async fn handle_driver_frame(state: &AppState, user_id: &str, text: &str) -> anyhow::Result<()> {
    let frame: WsMessage = serde_json::from_str(text)?;

    match frame.routing_key() {
        Ok(RoutingKey::DriverLocation) => {
            debug!("Location update from {} ignored", user_id);
        }
        Ok(routing_key @ (RoutingKey::DriverTripAccept | RoutingKey::DriverTripDecline)) => {
            let message = AmqpMessage {
                owner_id: user_id.to_string(),
                data: Some(frame.data),
            };
            state.broker.publish(routing_key, &message).await?;
            info!("Forwarded {} from driver {}", routing_key, user_id);
        }
        _ => warn!("Unknown frame type {} from driver {}", frame.kind, user_id),
    }
    Ok(())
}

// ============================================================================
// Socket pump
// ============================================================================

async fn pump(socket: WebSocket, state: &AppState, handle: &mut SessionHandle, role: Role) {
    let (mut sink, mut stream) = socket.split();
    let user_id = handle.user_id.clone();
    let session_id = handle.id;

    loop {
        tokio::select! {
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => match role {
                        Role::Driver => {
                            if let Err(e) = handle_driver_frame(state, &user_id, text.as_str()).await {
                                warn!("Driver {} frame rejected: {:#}", user_id, e);
                            }
                        }
                        Role::Rider => debug!("Rider {} sent: {}", user_id, text.as_str()),
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        info!("{:?} {} disconnected", role, user_id);
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", user_id, e);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }

            outbound = handle.outbound.recv() => {
                let Some(message) = outbound else {
                    info!("Session {} for {} superseded", session_id, user_id);
                    break;
                };
                match serde_json::to_string(&message) {
                    Ok(json) => {
                        if sink.send(Message::Text(json.into())).await.is_err() {
                            warn!("Failed to push {} to {}", message.kind, user_id);
                            break;
                        }
                    }
                    Err(e) => error!("Unencodable frame for {}: {}", user_id, e),
                }
            }
        }
    }

    let _ = sink.close().await;
}
