//! Outbound fan-out to live WebSocket connections.
//!
//! Holds one sender per accepted socket; delivery is a channel push, so a
//! slow or vanished peer never holds up the others.

use std::collections::HashMap;
use std::sync::Arc;

use locshare_core::{ConnectionId, SessionToken};
use logging::mask_token;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, trace};

use crate::ws_protocol::ServerEvent;

pub type ClientSender = mpsc::UnboundedSender<ServerEvent>;

/// Registry of outbound channels keyed by connection.
#[derive(Clone, Default)]
pub struct Broadcaster {
    connections: Arc<RwLock<HashMap<ConnectionId, ClientSender>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly accepted connection.
    pub async fn register(&self, connection: ConnectionId, sender: ClientSender) {
        let mut w = self.connections.write().await;
        w.insert(connection, sender);
    }

    /// Forget a closed connection.
    pub async fn unregister(&self, connection: ConnectionId) {
        let mut w = self.connections.write().await;
        w.remove(&connection);
    }

    /// Send an event to one connection. Returns `false` if it is gone.
    pub async fn send_to(&self, connection: ConnectionId, event: ServerEvent) -> bool {
        let r = self.connections.read().await;
        match r.get(&connection) {
            Some(sender) => sender.send(event).is_ok(),
            None => false,
        }
    }

    /// Deliver `event` to every viewer in the snapshot, skipping any that
    /// have gone away. Returns how many accepted it.
    pub async fn send_to_viewers(
        &self,
        session: &SessionToken,
        viewers: &[ConnectionId],
        event: ServerEvent,
    ) -> usize {
        let r = self.connections.read().await;
        let mut delivered = 0;
        for viewer in viewers {
            match r.get(viewer) {
                Some(sender) if sender.send(event.clone()).is_ok() => delivered += 1,
                _ => debug!(session = %mask_token(session.as_str()), viewer = %viewer, "viewer unreachable, skipping"),
            }
        }
        trace!(session = %mask_token(session.as_str()), delivered, total = viewers.len(), "broadcast");
        delivered
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}
