use crate::service::{
    error::{Result, ServiceError},
    tokens::TokenVerifier,
};
use flock_common::model::{Id, notification::NotificationPayload, user::UserMarker};
use serde::Serialize;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use tokio::sync::{
    RwLock,
    mpsc::{self, error::TrySendError},
};
use tracing::{debug, info, warn};

const CONNECTION_BUFFER: usize = 64;

/// Frames sent to a connected client.
#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum ServerEvent {
    /// First frame on every accepted connection.
    Connected(ConnectedPayload),
    Notification(NotificationPayload),
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedPayload {
    pub user_id: Id<UserMarker>,
}

/// Identity attached to a live connection once its token was accepted.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct ConnectionTag {
    pub user_id: Id<UserMarker>,
    pub connection_id: u64,
}

/// The receiving half of a registered connection.
#[derive(Debug)]
pub struct PresenceConnection {
    tag: ConnectionTag,
    events: mpsc::Receiver<ServerEvent>,
}

impl PresenceConnection {
    #[must_use]
    pub fn tag(&self) -> ConnectionTag {
        self.tag
    }

    /// `None` once the connection was superseded or the registry is gone.
    pub async fn next_event(&mut self) -> Option<ServerEvent> {
        self.events.recv().await
    }
}

#[derive(Debug)]
struct PresenceEntry {
    connection_id: u64,
    sender: mpsc::Sender<ServerEvent>,
}

/// Tracks the single live connection per online user.
pub struct PresenceRegistry {
    verifier: Arc<dyn TokenVerifier>,
    entries: RwLock<HashMap<Id<UserMarker>, PresenceEntry>>,
    next_connection_id: AtomicU64,
}

impl PresenceRegistry {
    pub fn new(verifier: Arc<dyn TokenVerifier>) -> Self {
        Self {
            verifier,
            entries: RwLock::new(HashMap::new()),
            next_connection_id: AtomicU64::new(0),
        }
    }

    /// Registers a connection for the token's user, replacing any older one.
    pub async fn connect(&self, token: Option<&str>) -> Result<PresenceConnection> {
        let Some(token) = token.filter(|token| !token.is_empty()) else {
            debug!("Connection attempt without token");
            return Err(ServiceError::Unauthorized);
        };

        let claims = self.verifier.verify(token).map_err(|err| {
            debug!(error = %err, "Connection attempt with invalid token");
            ServiceError::Unauthorized
        })?;

        let tag = ConnectionTag {
            user_id: claims.user_id,
            connection_id: self.next_connection_id.fetch_add(1, Ordering::Relaxed),
        };
        let (sender, events) = mpsc::channel(CONNECTION_BUFFER);

        let replaced = self.entries.write().await.insert(
            tag.user_id,
            PresenceEntry {
                connection_id: tag.connection_id,
                sender,
            },
        );

        if let Some(replaced) = replaced {
            debug!(
                user_id = %tag.user_id,
                replaced = replaced.connection_id,
                "Newer connection replaced existing one"
            );
        }
        info!(user_id = %tag.user_id, connection_id = tag.connection_id, "User connected");

        Ok(PresenceConnection { tag, events })
    }

    /// Only removes the entry if it still belongs to this connection.
    pub async fn disconnect(&self, tag: ConnectionTag) -> bool {
        let mut entries = self.entries.write().await;

        let current = entries
            .get(&tag.user_id)
            .is_some_and(|entry| entry.connection_id == tag.connection_id);

        if current {
            entries.remove(&tag.user_id);
            info!(user_id = %tag.user_id, connection_id = tag.connection_id, "User disconnected");
        }

        current
    }

    /// Best effort, `false` if the user is offline or not keeping up.
    pub async fn push(&self, user_id: Id<UserMarker>, event: ServerEvent) -> bool {
        let entries = self.entries.read().await;
        let Some(entry) = entries.get(&user_id) else {
            return false;
        };

        match entry.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(%user_id, "Dropping event for slow connection");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}
