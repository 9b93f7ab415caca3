//! Session protocol state machine.
//!
//! Drives create / join / reconnect / location-update / leave / disconnect
//! against the shared relay state. Each event locks the relay once, applies
//! its mutation, and queues its outbound events before the lock is released.
//! Queuing is a channel push, so every viewer sees events in the order the
//! relay applied them, even while a replaced sharer still has frames in
//! flight.

use chrono::{DateTime, Utc};
use locshare_core::{
    ConnectionBinding, ConnectionId, Location, Relay, RelayError, Role, SessionToken, SharedRelay,
};
use logging::mask_token;
use tracing::{debug, info};

use crate::broadcaster::Broadcaster;
use crate::ws_protocol::{ClientEvent, ServerEvent};

/// Result of a successful join, computed under the relay lock.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinOutcome {
    Viewer { catch_up: Option<Location> },
    Sharer { resume: bool },
}

#[derive(Clone)]
pub struct SessionProtocolHandler {
    relay: SharedRelay,
    broadcaster: Broadcaster,
}

impl SessionProtocolHandler {
    pub fn new(relay: SharedRelay, broadcaster: Broadcaster) -> Self {
        Self { relay, broadcaster }
    }

    /// Dispatch one decoded client event.
    pub async fn handle(&self, connection: ConnectionId, event: ClientEvent) {
        match event {
            ClientEvent::CreateSession => {
                self.create_session(connection).await;
            }
            ClientEvent::JoinSession(payload) => {
                let request = payload.into_request();
                self.join_session(connection, &request.session_id, request.is_reconnect)
                    .await;
            }
            ClientEvent::LocationUpdate(location) => {
                self.location_update(connection, location.lat, location.lng)
                    .await;
            }
            ClientEvent::LeaveSession => self.leave_session(connection).await,
            ClientEvent::Ping => {
                self.broadcaster.send_to(connection, ServerEvent::Pong).await;
            }
        }
    }

    /// Create a session with `connection` as its sharer.
    pub async fn create_session(&self, connection: ConnectionId) -> SessionToken {
        let token = {
            let mut guard = self.relay.lock().await;
            let relay = &mut *guard;
            release_binding(relay, connection);
            let session = relay.sessions.create(connection, Utc::now());
            relay
                .connections
                .bind(connection, session.id.clone(), Role::Sharer);
            session.id
        };

        info!(session = %mask_token(token.as_str()), connection = %connection, "session created");
        self.broadcaster
            .send_to(connection, ServerEvent::session_created(token.clone()))
            .await;
        token
    }

    /// Join `raw_token` as a viewer, or as the sharer when `is_reconnect` is set.
    ///
    /// Unknown or malformed tokens answer `session-not-found` and leave every
    /// binding untouched. The reconnect flag is trusted as-is: holding the
    /// token is the only credential.
    pub async fn join_session(
        &self,
        connection: ConnectionId,
        raw_token: &str,
        is_reconnect: bool,
    ) -> Option<JoinOutcome> {
        let token = match SessionToken::try_parse(raw_token) {
            Ok(token) => token,
            Err(_) => {
                debug!(connection = %connection, session = %mask_token(raw_token.trim()), "join rejected: malformed token");
                self.broadcaster
                    .send_to(connection, ServerEvent::session_not_found())
                    .await;
                return None;
            }
        };

        let mut guard = self.relay.lock().await;
        let outcome = match join_locked(&mut guard, connection, &token, is_reconnect, Utc::now()) {
            Ok(outcome) => outcome,
            Err(e) => {
                drop(guard);
                // RelayError's Display masks the token.
                debug!(connection = %connection, error = %e, "join rejected");
                self.broadcaster
                    .send_to(connection, ServerEvent::session_not_found())
                    .await;
                return None;
            }
        };

        // Replies are queued before the lock is released so the catch-up
        // location cannot be overtaken by a newer broadcast.
        match &outcome {
            JoinOutcome::Viewer { catch_up } => {
                info!(session = %mask_token(token.as_str()), connection = %connection, "viewer joined");
                self.broadcaster
                    .send_to(connection, ServerEvent::session_joined(token.clone()))
                    .await;
                if let Some(location) = catch_up {
                    self.broadcaster
                        .send_to(
                            connection,
                            ServerEvent::location(
                                location.latitude,
                                location.longitude,
                                location.observed_at,
                            ),
                        )
                        .await;
                }
            }
            JoinOutcome::Sharer { resume } => {
                info!(session = %mask_token(token.as_str()), connection = %connection, "sharer reconnected");
                self.broadcaster
                    .send_to(connection, ServerEvent::session_reconnected(token.clone()))
                    .await;
                if *resume {
                    self.broadcaster
                        .send_to(connection, ServerEvent::resume_sharing(token.clone()))
                        .await;
                }
            }
        }
        drop(guard);

        Some(outcome)
    }

    /// Accept a position from the session's sharer and fan it out.
    ///
    /// Anything else (unbound connection, viewer, replaced sharer, bad
    /// coordinates) is dropped without a reply. The broadcast is queued under
    /// the relay lock, so a viewer can never receive an older position after
    /// a newer one was recorded.
    pub async fn location_update(&self, connection: ConnectionId, lat: f64, lng: f64) -> bool {
        let mut guard = self.relay.lock().await;
        let relay = &mut *guard;
        let Some(ConnectionBinding { session_id, role }) =
            relay.connections.lookup(connection).cloned()
        else {
            return false;
        };
        let now = Utc::now();
        if role != Role::Sharer
            || !relay
                .sessions
                .record_location(&session_id, lat, lng, connection, now)
        {
            return false;
        }
        let viewers: Vec<ConnectionId> = match relay.sessions.get(session_id.as_str()) {
            Ok(session) => session.viewers.iter().copied().collect(),
            Err(_) => Vec::new(),
        };

        self.broadcaster
            .send_to_viewers(&session_id, &viewers, ServerEvent::location(lat, lng, now))
            .await;
        drop(guard);
        true
    }

    /// Unbind without closing the socket.
    pub async fn leave_session(&self, connection: ConnectionId) {
        let released = {
            let mut guard = self.relay.lock().await;
            release_binding(&mut guard, connection)
        };
        if let Some(binding) = released {
            debug!(session = %mask_token(binding.session_id.as_str()), connection = %connection, role = ?binding.role, "left session");
        }
    }

    /// Transport closed. Sharer sessions stay alive for a later reconnect.
    pub async fn disconnect(&self, connection: ConnectionId) {
        let released = {
            let mut guard = self.relay.lock().await;
            release_binding(&mut guard, connection)
        };
        match released {
            Some(ConnectionBinding { session_id, role: Role::Sharer }) => {
                info!(session = %mask_token(session_id.as_str()), connection = %connection, "sharer disconnected, session kept");
            }
            Some(ConnectionBinding { session_id, role: Role::Viewer }) => {
                debug!(session = %mask_token(session_id.as_str()), connection = %connection, "viewer disconnected");
            }
            None => {}
        }
    }
}

/// Undo a connection's current binding, if any. Never deletes a session.
fn release_binding(relay: &mut Relay, connection: ConnectionId) -> Option<ConnectionBinding> {
    let binding = relay.connections.unbind(connection)?;
    match binding.role {
        Role::Sharer => relay.sessions.detach_sharer(&binding.session_id, connection),
        Role::Viewer => relay.sessions.remove_viewer(&binding.session_id, connection),
    }
    Some(binding)
}

fn join_locked(
    relay: &mut Relay,
    connection: ConnectionId,
    token: &SessionToken,
    is_reconnect: bool,
    now: DateTime<Utc>,
) -> Result<JoinOutcome, RelayError> {
    // Existence first so a miss has no side effects.
    relay.sessions.get(token.as_str())?;

    if let Some(previous) = release_binding(relay, connection) {
        if &previous.session_id != token {
            debug!(connection = %connection, "connection switched sessions");
        }
    }

    let (outcome, role) = if is_reconnect {
        let session = relay.sessions.reattach_sharer(token, connection, now)?;
        (
            JoinOutcome::Sharer {
                resume: session.latest_location.is_some(),
            },
            Role::Sharer,
        )
    } else {
        let session = relay.sessions.attach_viewer(token, connection, now)?;
        (
            JoinOutcome::Viewer {
                catch_up: session.latest_location,
            },
            Role::Viewer,
        )
    };
    relay.connections.bind(connection, token.clone(), role);
    Ok(outcome)
}
