//! Shared relay state: the session store and connection registry behind a
//! single lock.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::registry::ConnectionRegistry;
use crate::store::SessionStore;

/// Both halves of the relay state. Mutated only while the enclosing
/// [`SharedRelay`] lock is held, so a binding and the session it points at
/// always change together.
#[derive(Debug, Default)]
pub struct Relay {
    pub sessions: SessionStore,
    pub connections: ConnectionRegistry,
}

pub type SharedRelay = Arc<Mutex<Relay>>;

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedRelay {
        Arc::new(Mutex::new(Self::new()))
    }
}
