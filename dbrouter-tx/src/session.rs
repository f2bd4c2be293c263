//! Connections enrolled in one cross-shard transaction.

use std::sync::Arc;

use dbrouter_core::DataSourceId;

use crate::connection::ConnectionHandle;

/// Per-call cache of enrolled connections, at most one per shard.
///
/// Registration order is kept; commit and rollback walk it front to back.
#[derive(Debug, Default)]
pub struct ShardSession {
    connections: Vec<ConnectionHandle>,
}

impl ShardSession {
    /// Creates an empty session.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            connections: Vec::new(),
        }
    }

    /// Returns the enrolled connection for `shard`.
    #[must_use]
    pub fn get(&self, shard: &DataSourceId) -> Option<ConnectionHandle> {
        self.connections
            .iter()
            .find(|c| c.shard() == shard)
            .map(Arc::clone)
    }

    /// Enrolls a connection. Returns false if its shard is already enrolled.
    pub fn register(&mut self, connection: ConnectionHandle) -> bool {
        if self.connections.iter().any(|c| c.shard() == connection.shard()) {
            return false;
        }
        self.connections.push(connection);
        true
    }

    /// Returns the number of enrolled shards.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Returns true if nothing is enrolled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Returns the enrolled shards in registration order.
    #[must_use]
    pub fn shards(&self) -> Vec<DataSourceId> {
        self.connections.iter().map(|c| c.shard().clone()).collect()
    }

    /// Iterates over enrolled connections in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ConnectionHandle> {
        self.connections.iter()
    }

    /// Removes and returns every enrolled connection.
    pub fn take(&mut self) -> Vec<ConnectionHandle> {
        std::mem::take(&mut self.connections)
    }
}
