//! WebSocket protocol for the locshare relay.
//!
//! Every frame is a JSON text message shaped `{"event": "...", "data": ...}`.

use chrono::{DateTime, Utc};
use locshare_core::SessionToken;
use serde::{Deserialize, Serialize};

/// Client -> Server events.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Start a new session with this connection as sharer.
    CreateSession,
    /// Join as viewer, or reclaim the sharer slot when `isReconnect` is set.
    JoinSession(JoinPayload),
    /// Publish a position. Only honoured from the session's sharer.
    LocationUpdate(LocationPayload),
    /// Unbind from the current session without closing the socket.
    LeaveSession,
    /// Keep-alive.
    Ping,
}

/// Older clients send the token as a bare string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum JoinPayload {
    Request(JoinRequest),
    Token(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub session_id: String,
    #[serde(default)]
    pub is_reconnect: bool,
}

impl JoinPayload {
    pub fn into_request(self) -> JoinRequest {
        match self {
            JoinPayload::Request(request) => request,
            JoinPayload::Token(session_id) => JoinRequest {
                session_id,
                is_reconnect: false,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationPayload {
    pub lat: f64,
    pub lng: f64,
}

/// Server -> Client events.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    SessionCreated(SessionRef),
    SessionJoined(SessionRef),
    SessionReconnected(SessionRef),
    SessionNotFound { message: String },
    /// Tells a reconnected sharer to restart its sampling loop.
    ResumeSharing(SessionRef),
    LocationUpdate(LocationBroadcast),
    /// The session was reclaimed after sitting idle.
    SessionExpired(SessionRef),
    Pong,
    /// The frame could not be decoded.
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRef {
    pub session_id: SessionToken,
}

/// `timestamp` is milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LocationBroadcast {
    pub lat: f64,
    pub lng: f64,
    pub timestamp: i64,
}

impl ServerEvent {
    pub fn session_created(session_id: SessionToken) -> Self {
        Self::SessionCreated(SessionRef { session_id })
    }

    pub fn session_joined(session_id: SessionToken) -> Self {
        Self::SessionJoined(SessionRef { session_id })
    }

    pub fn session_reconnected(session_id: SessionToken) -> Self {
        Self::SessionReconnected(SessionRef { session_id })
    }

    pub fn resume_sharing(session_id: SessionToken) -> Self {
        Self::ResumeSharing(SessionRef { session_id })
    }

    pub fn session_expired(session_id: SessionToken) -> Self {
        Self::SessionExpired(SessionRef { session_id })
    }

    pub fn session_not_found() -> Self {
        Self::SessionNotFound {
            message: "Session not found".to_string(),
        }
    }

    pub fn location(lat: f64, lng: f64, observed_at: DateTime<Utc>) -> Self {
        Self::LocationUpdate(LocationBroadcast {
            lat,
            lng,
            timestamp: observed_at.timestamp_millis(),
        })
    }
}
