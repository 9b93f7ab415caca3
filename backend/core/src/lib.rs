//! Core state for the locshare relay: session tokens, the session store and
//! the connection registry.

pub mod error;
pub mod registry;
pub mod relay;
pub mod session_id;
pub mod store;
pub mod types;

pub use error::RelayError;
pub use registry::{ConnectionBinding, ConnectionRegistry};
pub use relay::{Relay, SharedRelay};
pub use store::SessionStore;
pub use types::{ConnectionId, Location, Role, Session, SessionToken};
