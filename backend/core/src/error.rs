use logging::mask_token;
use thiserror::Error;

use crate::types::SessionToken;

/// Errors raised by the session store.
///
/// Display output masks the token, so these are safe to log as-is.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("session not found: {}", mask_token(.0.as_str()))]
    SessionNotFound(SessionToken),

    #[error("malformed session token: {}", mask_token(.0.trim()))]
    InvalidToken(String),
}

pub type Result<T> = std::result::Result<T, RelayError>;
