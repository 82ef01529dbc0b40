//! Public key to live connection mapping.
//!
//! At most one connection is registered per key. Registering a key that is
//! already taken evicts the previous connection: it is told to close and the
//! newer connection takes the slot.

use crate::connection::Connection;
use dashmap::DashMap;
use relay_types::PublicKey;

/// Concurrent registry of live connections.
#[derive(Debug, Default)]
pub struct Registry {
    connections: DashMap<PublicKey, Connection>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection under its public key.
    ///
    /// Returns the evicted connection, if any. The evicted connection has
    /// already been asked to close; its own teardown will find the slot
    /// taken and leave it alone.
    pub fn register(&self, connection: Connection) -> Option<Connection> {
        let key = connection.public_key().clone();
        let evicted = self.connections.insert(key, connection)?;
        evicted.close();
        tracing::info!(
            "Evicted connection {} for key {} (newer connection registered)",
            evicted.id(),
            evicted.public_key().fingerprint()
        );
        Some(evicted)
    }

    /// Remove a connection, but only if it still owns its key's slot.
    ///
    /// Returns true if the entry was removed.
    pub fn unregister(&self, connection: &Connection) -> bool {
        let removed = self
            .connections
            .remove_if(connection.public_key(), |_, current| {
                current.same_as(connection)
            })
            .is_some();

        if removed {
            tracing::debug!(
                "Unregistered connection {} for key {} (remaining: {})",
                connection.id(),
                connection.public_key().fingerprint(),
                self.connections.len()
            );
        }
        removed
    }

    /// Look up the live connection for a key.
    pub fn lookup(&self, key: &PublicKey) -> Option<Connection> {
        self.connections.get(key).map(|entry| entry.value().clone())
    }

    /// Whether a key currently has a registered connection.
    pub fn contains(&self, key: &PublicKey) -> bool {
        self.connections.contains_key(key)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connections are registered.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Ask every registered connection to close (server shutdown).
    ///
    /// Entries are removed by each connection's own teardown. Returns the
    /// number of connections signalled.
    pub fn close_all(&self) -> usize {
        let connections: Vec<Connection> = self
            .connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for connection in &connections {
            connection.close();
        }
        connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionState;
    use std::sync::Arc;

    fn connection(key: &[u8]) -> Connection {
        let (conn, _queue) = Connection::new(PublicKey::from_bytes(key), 4);
        conn.activate();
        conn
    }

    #[test]
    fn register_and_lookup() {
        let registry = Registry::new();
        let conn = connection(b"ka");

        assert!(registry.register(conn.clone()).is_none());

        let found = registry.lookup(conn.public_key()).unwrap();
        assert!(found.same_as(&conn));
        assert_eq!(registry.len(), 1);
        assert!(registry.lookup(&PublicKey::from_bytes(b"kb".to_vec())).is_none());
    }

    #[test]
    fn second_register_evicts_first() {
        let registry = Registry::new();
        let old = connection(b"ka");
        let new = connection(b"ka");

        registry.register(old.clone());
        let evicted = registry.register(new.clone()).unwrap();

        assert!(evicted.same_as(&old));
        assert!(old.is_closing());
        assert_eq!(new.state(), ConnectionState::Active);
        assert!(registry.lookup(old.public_key()).unwrap().same_as(&new));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn stale_unregister_is_noop() {
        let registry = Registry::new();
        let old = connection(b"ka");
        let new = connection(b"ka");

        registry.register(old.clone());
        registry.register(new.clone());

        // The evicted connection's teardown must not remove its successor
        assert!(!registry.unregister(&old));
        assert!(registry.lookup(new.public_key()).unwrap().same_as(&new));

        assert!(registry.unregister(&new));
        assert!(registry.is_empty());
    }

    #[test]
    fn unregister_removes_exactly_once() {
        let registry = Registry::new();
        let conn = connection(b"ka");
        registry.register(conn.clone());

        assert!(registry.unregister(&conn));
        assert!(!registry.unregister(&conn));
        assert!(!registry.contains(conn.public_key()));
    }

    #[test]
    fn close_all_signals_every_connection() {
        let registry = Registry::new();
        let a = connection(b"ka");
        let b = connection(b"kb");
        registry.register(a.clone());
        registry.register(b.clone());

        assert_eq!(registry.close_all(), 2);
        assert!(a.is_closing());
        assert!(b.is_closing());
    }

    #[test]
    fn concurrent_registers_leave_one_winner() {
        let registry = Arc::new(Registry::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    let conn = connection(b"shared");
                    registry.register(conn.clone());
                    conn
                })
            })
            .collect();
        let all: Vec<Connection> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(registry.len(), 1);
        let winner = registry
            .lookup(&PublicKey::from_bytes(b"shared".to_vec()))
            .unwrap();
        // Everyone but the winner has been told to close
        for conn in &all {
            assert_eq!(conn.same_as(&winner), !conn.is_closing());
        }
    }
}
