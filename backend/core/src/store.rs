//! In-memory session store.
//!
//! Single owner of every [`Session`]. Methods are synchronous and take the
//! current time explicitly; callers serialize access through the relay lock.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use logging::mask_token;
use tracing::debug;

use crate::error::{RelayError, Result};
use crate::session_id;
use crate::types::{ConnectionId, Location, Session, SessionToken};

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<SessionToken, Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh session owned by `sharer`.
    pub fn create(&mut self, sharer: ConnectionId, now: DateTime<Utc>) -> Session {
        let token = session_id::generate_unique(|t| self.sessions.contains_key(t));
        let session = Session::new(token.clone(), sharer, now);
        self.sessions.insert(token, session.clone());
        session
    }

    /// Look a session up by any spelling of its token.
    pub fn get(&self, raw: &str) -> Result<&Session> {
        let token = SessionToken::parse(raw);
        self.sessions
            .get(&token)
            .ok_or(RelayError::SessionNotFound(token))
    }

    pub fn contains(&self, token: &SessionToken) -> bool {
        self.sessions.contains_key(token)
    }

    fn get_mut(&mut self, token: &SessionToken) -> Result<&mut Session> {
        self.sessions
            .get_mut(token)
            .ok_or_else(|| RelayError::SessionNotFound(token.clone()))
    }

    /// Subscribe `connection` to the session. Adding twice is a no-op.
    pub fn attach_viewer(
        &mut self,
        token: &SessionToken,
        connection: ConnectionId,
        now: DateTime<Utc>,
    ) -> Result<&Session> {
        let session = self.get_mut(token)?;
        if session.is_sharer(connection) {
            session.sharer_connection = None;
        }
        session.viewers.insert(connection);
        session.touch(now);
        Ok(session)
    }

    /// Make `connection` the session's publisher, replacing any previous one.
    pub fn reattach_sharer(
        &mut self,
        token: &SessionToken,
        connection: ConnectionId,
        now: DateTime<Utc>,
    ) -> Result<&Session> {
        let session = self.get_mut(token)?;
        if let Some(previous) = session.sharer_connection.filter(|c| *c != connection) {
            debug!(session = %mask_token(token.as_str()), previous = %previous, "replacing sharer connection");
        }
        session.viewers.remove(&connection);
        session.sharer_connection = Some(connection);
        session.touch(now);
        Ok(session)
    }

    /// Overwrite the latest location if `connection` is the current sharer.
    ///
    /// Returns `false` without side effects for unknown sessions, other
    /// connections and out-of-range coordinates.
    pub fn record_location(
        &mut self,
        token: &SessionToken,
        latitude: f64,
        longitude: f64,
        connection: ConnectionId,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(session) = self.sessions.get_mut(token) else {
            return false;
        };
        if !session.is_sharer(connection) || !Location::is_valid_point(latitude, longitude) {
            return false;
        }
        session.latest_location = Some(Location {
            latitude,
            longitude,
            observed_at: now,
        });
        session.touch(now);
        true
    }

    pub fn remove_viewer(&mut self, token: &SessionToken, connection: ConnectionId) {
        if let Some(session) = self.sessions.get_mut(token) {
            session.viewers.remove(&connection);
        }
    }

    /// Clear the sharer slot if it still points at `connection`.
    pub fn detach_sharer(&mut self, token: &SessionToken, connection: ConnectionId) {
        if let Some(session) = self.sessions.get_mut(token) {
            if session.is_sharer(connection) {
                session.sharer_connection = None;
            }
        }
    }

    pub fn delete(&mut self, token: &SessionToken) -> Option<Session> {
        self.sessions.remove(token)
    }

    /// Remove every session idle for longer than `max_idle`.
    pub fn sweep_idle(&mut self, now: DateTime<Utc>, max_idle: Duration) -> Vec<SessionToken> {
        let max_idle = TimeDelta::from_std(max_idle).unwrap_or(TimeDelta::MAX);
        let expired: Vec<SessionToken> = self
            .sessions
            .values()
            .filter(|s| now.signed_duration_since(s.last_activity) > max_idle)
            .map(|s| s.id.clone())
            .collect();
        for token in &expired {
            self.sessions.remove(token);
        }
        if !expired.is_empty() {
            debug!(removed = expired.len(), remaining = self.sessions.len(), "swept idle sessions");
        }
        expired
    }

    pub fn viewer_count(&self, token: &SessionToken) -> usize {
        self.sessions.get(token).map_or(0, |s| s.viewers.len())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const TEN_MINUTES: Duration = Duration::from_secs(600);

    fn store_with_session() -> (SessionStore, SessionToken, ConnectionId) {
        let mut store = SessionStore::new();
        let sharer = ConnectionId::new();
        let session = store.create(sharer, Utc::now());
        (store, session.id, sharer)
    }

    #[test]
    fn create_initializes_session() {
        let (store, token, sharer) = store_with_session();
        let session = store.get(token.as_str()).unwrap();
        assert_eq!(session.sharer_connection, Some(sharer));
        assert!(session.viewers.is_empty());
        assert!(session.latest_location.is_none());
        assert_eq!(session.created_at, session.last_activity);
    }

    #[test]
    fn create_returns_distinct_tokens() {
        let mut store = SessionStore::new();
        let tokens: HashSet<_> = (0..500)
            .map(|_| store.create(ConnectionId::new(), Utc::now()).id)
            .collect();
        assert_eq!(tokens.len(), 500);
        assert_eq!(store.len(), 500);
    }

    #[test]
    fn get_normalizes_input() {
        let (store, token, _) = store_with_session();
        let spelled = format!("  {}  ", token.as_str().to_lowercase());
        assert_eq!(store.get(&spelled).unwrap().id, token);
    }

    #[test]
    fn get_unknown_token() {
        let store = SessionStore::new();
        assert_eq!(
            store.get("zzzz0000").unwrap_err(),
            RelayError::SessionNotFound(SessionToken::parse("ZZZZ0000"))
        );
    }

    #[test]
    fn attach_viewer_is_idempotent() {
        let (mut store, token, _) = store_with_session();
        let viewer = ConnectionId::new();
        store.attach_viewer(&token, viewer, Utc::now()).unwrap();
        store.attach_viewer(&token, viewer, Utc::now()).unwrap();
        assert_eq!(store.viewer_count(&token), 1);
    }

    #[test]
    fn attach_viewer_unknown_session() {
        let mut store = SessionStore::new();
        let token = SessionToken::parse("ABCDEFGH");
        assert!(matches!(
            store.attach_viewer(&token, ConnectionId::new(), Utc::now()),
            Err(RelayError::SessionNotFound(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn sharer_never_listed_as_viewer() {
        let (mut store, token, sharer) = store_with_session();
        store.attach_viewer(&token, sharer, Utc::now()).unwrap();
        let session = store.get(token.as_str()).unwrap();
        assert!(session.viewers.contains(&sharer));
        assert_eq!(session.sharer_connection, None);

        store.reattach_sharer(&token, sharer, Utc::now()).unwrap();
        let session = store.get(token.as_str()).unwrap();
        assert!(!session.viewers.contains(&sharer));
        assert_eq!(session.sharer_connection, Some(sharer));
    }

    #[test]
    fn reattach_sharer_refreshes_activity() {
        let (mut store, token, _) = store_with_session();
        let later = Utc::now() + TimeDelta::seconds(30);
        let replacement = ConnectionId::new();
        store.reattach_sharer(&token, replacement, later).unwrap();
        let session = store.get(token.as_str()).unwrap();
        assert_eq!(session.sharer_connection, Some(replacement));
        assert_eq!(session.last_activity, later);
    }

    #[test]
    fn record_location_only_from_sharer() {
        let (mut store, token, sharer) = store_with_session();
        let intruder = ConnectionId::new();

        assert!(store.record_location(&token, 37.0, -122.0, sharer, Utc::now()));
        assert!(!store.record_location(&token, 1.0, 1.0, intruder, Utc::now()));

        let location = store.get(token.as_str()).unwrap().latest_location.unwrap();
        assert_eq!(location.latitude, 37.0);
        assert_eq!(location.longitude, -122.0);
    }

    #[test]
    fn record_location_rejects_bad_coordinates() {
        let (mut store, token, sharer) = store_with_session();
        assert!(!store.record_location(&token, 123.0, 0.0, sharer, Utc::now()));
        assert!(!store.record_location(&token, 0.0, f64::INFINITY, sharer, Utc::now()));
        assert!(store.get(token.as_str()).unwrap().latest_location.is_none());
    }

    #[test]
    fn record_location_refreshes_activity() {
        let (mut store, token, sharer) = store_with_session();
        let later = Utc::now() + TimeDelta::seconds(5);
        assert!(store.record_location(&token, 1.0, 2.0, sharer, later));
        let session = store.get(token.as_str()).unwrap();
        assert_eq!(session.last_activity, later);
        assert_eq!(session.latest_location.unwrap().observed_at, later);
    }

    #[test]
    fn detach_sharer_keeps_session() {
        let (mut store, token, sharer) = store_with_session();
        store.detach_sharer(&token, ConnectionId::new());
        assert_eq!(store.get(token.as_str()).unwrap().sharer_connection, Some(sharer));

        store.detach_sharer(&token, sharer);
        assert_eq!(store.get(token.as_str()).unwrap().sharer_connection, None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_viewer_is_idempotent() {
        let (mut store, token, _) = store_with_session();
        let viewer = ConnectionId::new();
        store.attach_viewer(&token, viewer, Utc::now()).unwrap();
        store.remove_viewer(&token, viewer);
        store.remove_viewer(&token, viewer);
        assert_eq!(store.viewer_count(&token), 0);
    }

    #[test]
    fn sweep_removes_only_idle_sessions() {
        let mut store = SessionStore::new();
        let start = Utc::now();
        let stale = store.create(ConnectionId::new(), start).id;
        let fresh = store.create(ConnectionId::new(), start).id;

        let sweep_at = start + TimeDelta::minutes(11);
        store.reattach_sharer(&fresh, ConnectionId::new(), sweep_at - TimeDelta::seconds(1)).unwrap();

        let removed = store.sweep_idle(sweep_at, TEN_MINUTES);
        assert_eq!(removed, vec![stale.clone()]);
        assert!(!store.contains(&stale));
        assert!(store.contains(&fresh));
    }

    #[test]
    fn sweep_keeps_session_at_exact_timeout() {
        let mut store = SessionStore::new();
        let start = Utc::now();
        let token = store.create(ConnectionId::new(), start).id;
        assert!(store.sweep_idle(start + TimeDelta::minutes(10), TEN_MINUTES).is_empty());
        assert!(store.contains(&token));
    }

    #[test]
    fn delete_frees_token() {
        let (mut store, token, _) = store_with_session();
        assert!(store.delete(&token).is_some());
        assert!(store.get(token.as_str()).is_err());
        assert!(store.delete(&token).is_none());
    }
}
