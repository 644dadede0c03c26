use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::debug;
use uuid::Uuid;

use herald_types::events::GatewayEvent;

/// A user's live connection: the id of the socket task that owns it and
/// the channel feeding that task's send loop.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    conn_id: Uuid,
    tx: mpsc::UnboundedSender<GatewayEvent>,
}

impl ConnectionHandle {
    /// Push an event at the connection. False means the receiving task is
    /// already gone; callers treat that the same as the user being
    /// offline.
    pub fn send(&self, event: GatewayEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Who is connected right now.
///
/// At most one entry per user: registering again supersedes the previous
/// connection (last writer wins), and unregistering compares connection
/// ids so a straggling disconnect from a superseded socket cannot evict
/// its replacement. Purely in-memory; after a restart everyone is simply
/// offline and the notification store carries what they missed.
#[derive(Clone)]
pub struct PresenceRegistry {
    connections: Arc<RwLock<HashMap<Uuid, ConnectionHandle>>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register the caller as the user's live connection. Returns the
    /// connection id (needed for the matching unregister) and the
    /// receiver the socket task drains into its send loop.
    pub async fn register(
        &self,
        user_id: Uuid,
    ) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        let previous = self
            .connections
            .write()
            .await
            .insert(user_id, ConnectionHandle { conn_id, tx });
        if previous.is_some() {
            debug!("Superseded previous connection for {}", user_id);
        }

        (conn_id, rx)
    }

    /// Remove the user's entry, but only if it still belongs to
    /// `conn_id`.
    pub async fn unregister(&self, user_id: Uuid, conn_id: Uuid) {
        let mut connections = self.connections.write().await;
        if let Some(handle) = connections.get(&user_id) {
            if handle.conn_id == conn_id {
                connections.remove(&user_id);
            }
        }
    }

    /// The user's live connection, if any. Absence is normal, not an
    /// error.
    pub async fn lookup(&self, user_id: Uuid) -> Option<ConnectionHandle> {
        self.connections.read().await.get(&user_id).cloned()
    }

    /// How many users are connected.
    pub async fn online_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
