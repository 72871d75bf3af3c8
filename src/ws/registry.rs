use std::collections::HashMap;

use parking_lot::RwLock;

use super::connection::ConnectionHandle;
use crate::shared::types::ConnectionId;

/// The set of live connections, keyed by id.
///
/// This is the only state shared between connection flows. Iteration goes
/// through [`Registry::snapshot`], so inserts and removals made while a
/// broadcast is running never invalidate it.
#[derive(Debug, Default)]
pub struct Registry {
    connections: RwLock<HashMap<ConnectionId, ConnectionHandle>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, connection: ConnectionHandle) {
        self.connections.write().insert(connection.id(), connection);
    }

    /// Returns the removed connection; `None` if it was already gone.
    pub fn remove(&self, id: ConnectionId) -> Option<ConnectionHandle> {
        self.connections.write().remove(&id)
    }

    pub fn get(&self, id: ConnectionId) -> Option<ConnectionHandle> {
        self.connections.read().get(&id).cloned()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.read().contains_key(&id)
    }

    pub fn snapshot(&self) -> Vec<ConnectionHandle> {
        self.connections.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }
}
