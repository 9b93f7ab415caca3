use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RelayError;
use crate::session_id::{TOKEN_ALPHABET, TOKEN_LENGTH};

/// Identifier of one live transport connection.
///
/// Minted by the gateway when a socket is accepted; it carries no
/// transport internals and is never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Normalized session token (trimmed, uppercase).
///
/// Lookups and storage always go through [`SessionToken::parse`], so two
/// spellings of the same token compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn parse(raw: &str) -> Self {
        Self(raw.trim().to_uppercase())
    }

    /// Normalize and reject anything the generator could not have produced.
    pub fn try_parse(raw: &str) -> Result<Self, RelayError> {
        let token = Self::parse(raw);
        if token.is_well_formed() {
            Ok(token)
        } else {
            Err(RelayError::InvalidToken(raw.to_string()))
        }
    }

    /// True when the token has the shape the generator produces.
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == TOKEN_LENGTH && self.0.bytes().all(|b| TOKEN_ALPHABET.contains(&b))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionToken {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The role a connection plays inside the session it is bound to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Sharer,
    Viewer,
}

/// A published position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub observed_at: DateTime<Utc>,
}

impl Location {
    /// Whether a latitude/longitude pair is a finite point on the globe.
    pub fn is_valid_point(latitude: f64, longitude: f64) -> bool {
        latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude)
    }
}

/// One sharer, its viewers, and the last accepted position.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionToken,
    pub sharer_connection: Option<ConnectionId>,
    pub viewers: HashSet<ConnectionId>,
    pub latest_location: Option<Location>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    pub fn new(id: SessionToken, sharer: ConnectionId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            sharer_connection: Some(sharer),
            viewers: HashSet::new(),
            latest_location: None,
            created_at: now,
            last_activity: now,
        }
    }

    /// The explicit write gate: only the current sharer may publish.
    pub fn is_sharer(&self, connection: ConnectionId) -> bool {
        self.sharer_connection == Some(connection)
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_parse_normalizes() {
        let token = SessionToken::parse("  ab12cd34\n");
        assert_eq!(token.as_str(), "AB12CD34");
        assert!(token.is_well_formed());
    }

    #[test]
    fn token_shape_is_checked() {
        assert!(!SessionToken::parse("ABC").is_well_formed());
        assert!(!SessionToken::parse("AB12CD3!").is_well_formed());
        assert!(!SessionToken::parse("AB12CD345").is_well_formed());
        assert!(!SessionToken::parse("ÄB12CD34").is_well_formed());
    }

    #[test]
    fn try_parse_rejects_garbage() {
        assert_eq!(
            SessionToken::try_parse("nope"),
            Err(RelayError::InvalidToken("nope".to_string()))
        );
        assert_eq!(SessionToken::try_parse(" zz99yy88 ").unwrap().as_str(), "ZZ99YY88");
    }

    #[test]
    fn valid_points() {
        assert!(Location::is_valid_point(37.0, -122.0));
        assert!(Location::is_valid_point(-90.0, 180.0));
        assert!(!Location::is_valid_point(90.5, 0.0));
        assert!(!Location::is_valid_point(0.0, -180.1));
        assert!(!Location::is_valid_point(f64::NAN, 0.0));
    }

    #[test]
    fn sharer_gate() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let session = Session::new(SessionToken::parse("AAAA1111"), a, Utc::now());
        assert!(session.is_sharer(a));
        assert!(!session.is_sharer(b));
    }
}
