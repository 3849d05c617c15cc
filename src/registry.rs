//! Connection registry: the single source of truth for which connections
//! exist, which room each one currently belongs to, and the handle to its
//! outbound queue.
//!
//! The registry owns connection bookkeeping exclusively; room membership
//! lists reference connections by id and never own them. Backed by a
//! sharded concurrent map so lookups on unrelated connections never
//! contend.

use dashmap::DashMap;
use std::sync::Arc;

use crate::protocol::{ConnectionId, DocumentId};
use crate::queue::SendQueue;

struct ConnectionEntry {
    /// Current room, unset until a join is processed.
    room: Option<DocumentId>,
    /// Outbound queue, drained by the connection's send pump.
    queue: Arc<SendQueue>,
}

/// Registry of live connections.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, ConnectionEntry>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh connection identity. Infallible.
    pub fn register(&self, queue: Arc<SendQueue>) -> ConnectionId {
        let id = ConnectionId::new();
        self.connections
            .insert(id, ConnectionEntry { room: None, queue });
        log::debug!("registered connection {id}");
        id
    }

    /// Record the connection's current room. Overwriting a previous value
    /// is the leave-old/join-new transition — a connection never holds two
    /// memberships.
    pub fn set_room(&self, id: ConnectionId, room: Option<DocumentId>) {
        if let Some(mut entry) = self.connections.get_mut(&id) {
            entry.room = room;
        }
    }

    /// The room the connection currently belongs to, if any.
    pub fn room_of(&self, id: ConnectionId) -> Option<DocumentId> {
        self.connections.get(&id).and_then(|e| e.room.clone())
    }

    /// Handle to the connection's outbound queue. `None` once the
    /// connection has been unregistered — an expected race during fan-out.
    pub fn queue_of(&self, id: ConnectionId) -> Option<Arc<SendQueue>> {
        self.connections.get(&id).map(|e| e.queue.clone())
    }

    /// Remove the connection's bookkeeping and close its queue.
    ///
    /// Must be called exactly once, after the connection has left any room
    /// it was a member of (the router's teardown path enforces that order).
    /// Returns whether the connection was still registered.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        match self.connections.remove(&id) {
            Some((_, entry)) => {
                entry.queue.close();
                log::debug!("unregistered connection {id}");
                true
            }
            None => false,
        }
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> Arc<SendQueue> {
        Arc::new(SendQueue::new(8))
    }

    #[test]
    fn test_register_starts_unjoined() {
        let registry = ConnectionRegistry::new();
        let id = registry.register(queue());

        assert_eq!(registry.len(), 1);
        assert!(registry.room_of(id).is_none());
        assert!(registry.queue_of(id).is_some());
    }

    #[test]
    fn test_set_room_overwrites() {
        let registry = ConnectionRegistry::new();
        let id = registry.register(queue());

        let doc_a = DocumentId::parse("doc-a").unwrap();
        let doc_b = DocumentId::parse("doc-b").unwrap();

        registry.set_room(id, Some(doc_a.clone()));
        assert_eq!(registry.room_of(id), Some(doc_a));

        registry.set_room(id, Some(doc_b.clone()));
        assert_eq!(registry.room_of(id), Some(doc_b));

        registry.set_room(id, None);
        assert!(registry.room_of(id).is_none());
    }

    #[test]
    fn test_unregister_closes_queue() {
        let registry = ConnectionRegistry::new();
        let q = queue();
        let id = registry.register(q.clone());

        assert!(registry.unregister(id));
        assert!(q.is_closed());
        assert!(registry.queue_of(id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unregister_twice_is_safe() {
        let registry = ConnectionRegistry::new();
        let id = registry.register(queue());

        assert!(registry.unregister(id));
        assert!(!registry.unregister(id));
    }

    #[test]
    fn test_unknown_connection_lookups() {
        let registry = ConnectionRegistry::new();
        let ghost = ConnectionId::new();

        assert!(registry.room_of(ghost).is_none());
        assert!(registry.queue_of(ghost).is_none());
        registry.set_room(ghost, DocumentId::parse("doc-1")); // no-op
        assert!(registry.is_empty());
    }
}
