use rideline_shared::WsMessage;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

pub type SessionId = u64;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("No live session for user {0}")]
    NoSession(String),

    #[error("Outbound buffer full for user {0}")]
    Saturated(String),

    #[error("Session for user {0} is closed")]
    Closed(String),

    #[error("WebSocket upgrade failed: {0}")]
    Upgrade(String),

    #[error("Frame encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

struct Session {
    id: SessionId,
    tx: mpsc::Sender<WsMessage>,
}

/// The receiving half of a registered session. The socket task drains
/// `outbound`; it yields `None` once the session is replaced or removed.
#[derive(Debug)]
pub struct SessionHandle {
    pub id: SessionId,
    pub user_id: String,
    pub outbound: mpsc::Receiver<WsMessage>,
}

/// Live client sessions, at most one per user id.
pub struct ConnectionManager {
    sessions: Mutex<HashMap<String, Session>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl ConnectionManager {
    pub fn new(buffer: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    /// Register a session for `user_id`. An existing session for the same
    /// user is replaced and its outbound channel closed.
    pub async fn add(&self, user_id: &str) -> SessionHandle {
        let (tx, outbound) = mpsc::channel(self.buffer);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let previous = self
            .sessions
            .lock()
            .await
            .insert(user_id.to_string(), Session { id, tx });

        match previous {
            Some(old) => info!("Session {} for {} replaced by session {}", old.id, user_id, id),
            None => info!("Session {} opened for {}", id, user_id),
        }

        SessionHandle {
            id,
            user_id: user_id.to_string(),
            outbound,
        }
    }

    /// Drop whatever session `user_id` has. Safe when there is none.
    pub async fn remove(&self, user_id: &str) -> bool {
        let removed = self.sessions.lock().await.remove(user_id);
        match &removed {
            Some(session) => info!("Session {} for {} removed", session.id, user_id),
            None => debug!("No session to remove for {}", user_id),
        }
        removed.is_some()
    }

    /// Remove the session behind `handle` unless a newer one has replaced it.
    /// Returns whether `handle` was still the live session.
    pub async fn release(&self, handle: &SessionHandle) -> bool {
        let mut sessions = self.sessions.lock().await;
        match sessions.get(&handle.user_id) {
            Some(current) if current.id == handle.id => {
                sessions.remove(&handle.user_id);
                info!("Session {} for {} closed", handle.id, handle.user_id);
                true
            }
            _ => {
                debug!("Session {} for {} was already superseded", handle.id, handle.user_id);
                false
            }
        }
    }

    /// Queue `message` for the user's socket without waiting.
    pub async fn send_message(&self, user_id: &str, message: WsMessage) -> Result<(), SessionError> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get(user_id)
            .ok_or_else(|| SessionError::NoSession(user_id.to_string()))?;

        match session.tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!("Dropping {} for {}: outbound buffer full", dropped.kind, user_id);
                Err(SessionError::Saturated(user_id.to_string()))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                sessions.remove(user_id);
                Err(SessionError::Closed(user_id.to_string()))
            }
        }
    }

    pub async fn is_connected(&self, user_id: &str) -> bool {
        self.sessions.lock().await.contains_key(user_id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}
