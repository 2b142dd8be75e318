//! Lobby Channel
//!
//! Subscription-scoped publication of waiting-session lists. Only
//! connections that entered the lobby receive updates; there is no
//! broadcast-to-everyone.

use std::collections::BTreeMap;

use tokio::sync::{mpsc, RwLock};

use crate::duel::session::ConnectionId;
use crate::network::protocol::ServerMessage;

/// Registry of lobby subscribers.
pub struct LobbyChannel {
    subscribers: RwLock<BTreeMap<ConnectionId, mpsc::Sender<ServerMessage>>>,
}

impl LobbyChannel {
    /// Create an empty channel.
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(BTreeMap::new()),
        }
    }

    /// Subscribe a connection to lobby updates.
    pub async fn subscribe(&self, connection: ConnectionId, sender: mpsc::Sender<ServerMessage>) {
        self.subscribers.write().await.insert(connection, sender);
    }

    /// Remove a connection's subscription.
    pub async fn unsubscribe(&self, connection: &ConnectionId) {
        self.subscribers.write().await.remove(connection);
    }

    /// Send a message to every subscriber. Closed channels are skipped;
    /// their subscriptions are cleaned up when the connection goes away.
    pub async fn publish(&self, message: ServerMessage) {
        let subscribers = self.subscribers.read().await;
        for sender in subscribers.values() {
            let _ = sender.send(message.clone()).await;
        }
    }

    /// Number of active subscriptions.
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}

impl Default for LobbyChannel {
    fn default() -> Self {
        Self::new()
    }
}
