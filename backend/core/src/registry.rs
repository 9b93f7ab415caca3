//! Connection → session binding bookkeeping.

use std::collections::HashMap;

use crate::types::{ConnectionId, Role, SessionToken};

/// What a live connection is currently bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionBinding {
    pub session_id: SessionToken,
    pub role: Role,
}

/// Maps each bound connection to its session and role.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    bindings: HashMap<ConnectionId, ConnectionBinding>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind or rebind a connection. Returns the previous binding, if any.
    pub fn bind(
        &mut self,
        connection: ConnectionId,
        session_id: SessionToken,
        role: Role,
    ) -> Option<ConnectionBinding> {
        self.bindings
            .insert(connection, ConnectionBinding { session_id, role })
    }

    pub fn lookup(&self, connection: ConnectionId) -> Option<&ConnectionBinding> {
        self.bindings.get(&connection)
    }

    pub fn unbind(&mut self, connection: ConnectionId) -> Option<ConnectionBinding> {
        self.bindings.remove(&connection)
    }

    /// Drop every binding that points at `session_id`, returning the
    /// connections that were affected.
    pub fn unbind_session(&mut self, session_id: &SessionToken) -> Vec<ConnectionId> {
        let mut removed = Vec::new();
        self.bindings.retain(|connection, binding| {
            if &binding.session_id == session_id {
                removed.push(*connection);
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
