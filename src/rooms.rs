//! Room manager: membership lists keyed by document id.
//!
//! Room existence is presence-derived — a room is created lazily on first
//! join and deleted atomically with the removal of its last member, so a
//! zero-member room is never observable. Backed by a sharded concurrent
//! map: operations on distinct documents proceed independently, while
//! join/leave/members_except on the same room serialize on its shard entry.
//! A single global lock across all rooms would serialize unrelated
//! documents' traffic and is deliberately not used here.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashSet;

use crate::protocol::{ConnectionId, DocumentId};

/// Active rooms and their members.
#[derive(Default)]
pub struct RoomManager {
    rooms: DashMap<DocumentId, HashSet<ConnectionId>>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to the room, creating the room on first join.
    ///
    /// Idempotent for the same connection. Returns a snapshot of the room's
    /// membership after the join.
    pub fn join(&self, doc: DocumentId, conn: ConnectionId) -> Vec<ConnectionId> {
        let mut members = self.rooms.entry(doc.clone()).or_default();
        if members.insert(conn) && members.len() == 1 {
            log::debug!("room {doc} created");
        }
        members.iter().copied().collect()
    }

    /// Remove a connection from the room. When the last member leaves, the
    /// room is deleted in the same operation. Returns whether the
    /// connection was a member.
    pub fn leave(&self, doc: &DocumentId, conn: ConnectionId) -> bool {
        match self.rooms.entry(doc.clone()) {
            Entry::Occupied(mut entry) => {
                let was_member = entry.get_mut().remove(&conn);
                if entry.get().is_empty() {
                    entry.remove();
                    log::debug!("room {doc} removed (empty)");
                }
                was_member
            }
            Entry::Vacant(_) => false,
        }
    }

    /// Snapshot of the room's members minus the given connection — the
    /// fan-out recipient set. An absent room yields an empty snapshot, the
    /// expected state after a racing leave emptied it, not an error.
    pub fn members_except(&self, doc: &DocumentId, conn: ConnectionId) -> Vec<ConnectionId> {
        self.rooms
            .get(doc)
            .map(|members| members.iter().filter(|m| **m != conn).copied().collect())
            .unwrap_or_default()
    }

    /// Whether the connection is currently a member of the room.
    pub fn contains(&self, doc: &DocumentId, conn: ConnectionId) -> bool {
        self.rooms
            .get(doc)
            .map(|members| members.contains(&conn))
            .unwrap_or(false)
    }

    /// Member count of a room; zero for an absent room.
    pub fn member_count(&self, doc: &DocumentId) -> usize {
        self.rooms.get(doc).map(|members| members.len()).unwrap_or(0)
    }

    /// Number of active rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Document ids of all active rooms.
    pub fn active_documents(&self) -> Vec<DocumentId> {
        self.rooms.iter().map(|e| e.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str) -> DocumentId {
        DocumentId::parse(id).unwrap()
    }

    #[test]
    fn test_create_on_first_join() {
        let rooms = RoomManager::new();
        let conn = ConnectionId::new();

        assert_eq!(rooms.room_count(), 0);
        assert_eq!(rooms.join(doc("doc-1"), conn), vec![conn]);
        assert_eq!(rooms.room_count(), 1);
        assert!(rooms.contains(&doc("doc-1"), conn));
    }

    #[test]
    fn test_join_idempotent() {
        let rooms = RoomManager::new();
        let conn = ConnectionId::new();

        assert_eq!(rooms.join(doc("doc-1"), conn), vec![conn]);
        assert_eq!(rooms.join(doc("doc-1"), conn), vec![conn]);
        assert_eq!(rooms.member_count(&doc("doc-1")), 1);
    }

    #[test]
    fn test_last_leave_deletes_room() {
        let rooms = RoomManager::new();
        let a = ConnectionId::new();
        let b = ConnectionId::new();

        rooms.join(doc("doc-1"), a);
        rooms.join(doc("doc-1"), b);

        assert!(rooms.leave(&doc("doc-1"), b));
        assert_eq!(rooms.member_count(&doc("doc-1")), 1);
        assert_eq!(rooms.room_count(), 1);

        assert!(rooms.leave(&doc("doc-1"), a));
        assert_eq!(rooms.room_count(), 0);
        assert_eq!(rooms.member_count(&doc("doc-1")), 0);
    }

    #[test]
    fn test_leave_unknown_room_or_member() {
        let rooms = RoomManager::new();
        let a = ConnectionId::new();
        let b = ConnectionId::new();

        assert!(!rooms.leave(&doc("ghost"), a));

        rooms.join(doc("doc-1"), a);
        // b never joined; room must survive with a intact.
        assert!(!rooms.leave(&doc("doc-1"), b));
        assert_eq!(rooms.member_count(&doc("doc-1")), 1);
    }

    #[test]
    fn test_members_except_excludes_sender() {
        let rooms = RoomManager::new();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let c = ConnectionId::new();

        rooms.join(doc("doc-1"), a);
        rooms.join(doc("doc-1"), b);
        rooms.join(doc("doc-1"), c);

        let recipients = rooms.members_except(&doc("doc-1"), a);
        assert_eq!(recipients.len(), 2);
        assert!(!recipients.contains(&a));
        assert!(recipients.contains(&b));
        assert!(recipients.contains(&c));
    }

    #[test]
    fn test_members_except_absent_room_is_empty() {
        let rooms = RoomManager::new();
        assert!(rooms
            .members_except(&doc("since-emptied"), ConnectionId::new())
            .is_empty());
    }

    #[test]
    fn test_rooms_are_isolated() {
        let rooms = RoomManager::new();
        let a = ConnectionId::new();
        let b = ConnectionId::new();

        rooms.join(doc("doc-1"), a);
        rooms.join(doc("doc-2"), b);

        assert_eq!(rooms.room_count(), 2);
        assert!(rooms.members_except(&doc("doc-1"), a).is_empty());
        assert_eq!(rooms.members_except(&doc("doc-2"), a), vec![b]);

        let docs = rooms.active_documents();
        assert!(docs.contains(&doc("doc-1")));
        assert!(docs.contains(&doc("doc-2")));
    }
}
