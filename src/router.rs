//! Event router: the protocol logic of the relay.
//!
//! Interprets inbound events and decides their destinations, applying the
//! broadcast-to-room-except-sender rule. All routing work is fast, in-memory
//! and non-blocking: fan-out pushes onto per-connection queues and never
//! waits on network I/O, so one slow connection cannot stall delivery to
//! others.
//!
//! Per-connection state machine:
//!
//! ```text
//! Unjoined ──join──► Joined(A) ──join B──► Joined(B)   (implicit leave of A)
//!     │                  │
//!     └──disconnect──► Terminated ◄──disconnect──┘
//! ```

use std::fmt;
use std::sync::Arc;

use crate::protocol::{ClientEvent, ConnectionId, DocumentId, RejectReason, ServerEvent};
use crate::registry::ConnectionRegistry;
use crate::rooms::RoomManager;
use crate::server::RelayStats;

/// Routing failures. Local to the offending connection; the connection
/// stays open and no fan-out occurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteError {
    /// Malformed document identifier on join.
    InvalidRoomId,
    /// Edit/cursor event naming a room the sender has not joined.
    NotAMember,
}

impl RouteError {
    fn reason(self) -> RejectReason {
        match self {
            Self::InvalidRoomId => RejectReason::InvalidRoomId,
            Self::NotAMember => RejectReason::NotAMember,
        }
    }
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRoomId => write!(f, "invalid room id"),
            Self::NotAMember => write!(f, "not a member of the room"),
        }
    }
}

impl std::error::Error for RouteError {}

/// Routes inbound events to room members.
pub struct EventRouter {
    registry: Arc<ConnectionRegistry>,
    rooms: Arc<RoomManager>,
    stats: Arc<RelayStats>,
}

impl EventRouter {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        rooms: Arc<RoomManager>,
        stats: Arc<RelayStats>,
    ) -> Self {
        Self {
            registry,
            rooms,
            stats,
        }
    }

    /// Process a join. Validates the id, performs the implicit leave when
    /// the connection already belongs to a different room, and updates the
    /// registry's room pointer. No broadcast is emitted for a join.
    ///
    /// Returns the room's member count after the join.
    pub fn handle_join(&self, conn: ConnectionId, raw_id: &str) -> Result<usize, RouteError> {
        let doc = DocumentId::parse(raw_id).ok_or(RouteError::InvalidRoomId)?;

        let previous = self.registry.room_of(conn);
        if let Some(old) = previous {
            if old == doc {
                // Re-join of the current room is a no-op join.
                return Ok(self.rooms.join(doc, conn).len());
            }
            // A connection belongs to at most one room at a time.
            self.rooms.leave(&old, conn);
            log::debug!("connection {conn} left room {old} (re-join)");
        }

        let members = self.rooms.join(doc.clone(), conn);
        self.registry.set_room(conn, Some(doc.clone()));
        log::info!(
            "connection {conn} joined room {doc} ({} members)",
            members.len()
        );
        Ok(members.len())
    }

    /// Fan an edit delta out to the other members of the sender's room.
    /// The delta is carried unchanged; this layer never parses, transforms
    /// or reorders it against other senders' deltas.
    pub fn handle_edit(
        &self,
        sender: ConnectionId,
        raw_id: &str,
        delta: Vec<u8>,
    ) -> Result<usize, RouteError> {
        self.relay(sender, raw_id, |document_id| ServerEvent::EditDelta {
            document_id,
            sender,
            delta,
        })
    }

    /// Fan a cursor move out. Same membership gate and fan-out path as
    /// edits, carrying `range` opaquely.
    pub fn handle_cursor(
        &self,
        sender: ConnectionId,
        raw_id: &str,
        range: Vec<u8>,
    ) -> Result<usize, RouteError> {
        self.relay(sender, raw_id, |document_id| ServerEvent::CursorMove {
            document_id,
            sender,
            range,
        })
    }

    /// The single teardown path, for both client-initiated close and
    /// transport failure: leave the current room (retiring it if the
    /// connection was the last member), then unregister.
    pub fn handle_disconnect(&self, conn: ConnectionId) {
        if let Some(doc) = self.registry.room_of(conn) {
            self.rooms.leave(&doc, conn);
            log::info!("connection {conn} left room {doc} (disconnect)");
        }
        self.registry.unregister(conn);
    }

    /// Dispatch a decoded inbound event. Rejections are acknowledged to the
    /// sender on its own queue; they never reach other connections.
    pub fn dispatch(&self, conn: ConnectionId, event: ClientEvent) {
        let result = match event {
            ClientEvent::Join { document_id } => {
                self.handle_join(conn, &document_id).map(|_| ())
            }
            ClientEvent::EditDelta { document_id, delta } => {
                self.handle_edit(conn, &document_id, delta).map(|_| ())
            }
            ClientEvent::CursorMove { document_id, range } => {
                self.handle_cursor(conn, &document_id, range).map(|_| ())
            }
        };

        if let Err(err) = result {
            log::debug!("rejected event from {conn}: {err}");
            self.stats.record_rejected();
            if let Some(queue) = self.registry.queue_of(conn) {
                queue.push(ServerEvent::Rejected {
                    reason: err.reason(),
                });
            }
        }
    }

    /// Shared fan-out path for edit and cursor events.
    ///
    /// The recipient set is a single membership snapshot, so an event is
    /// never partially broadcast: everyone in the snapshot gets exactly one
    /// copy, the sender gets none. Returns the number of recipients.
    fn relay(
        &self,
        sender: ConnectionId,
        raw_id: &str,
        build: impl FnOnce(DocumentId) -> ServerEvent,
    ) -> Result<usize, RouteError> {
        // Membership gate: the sender's registered room must be the room it
        // names. Anything else — unjoined, a different room, or an id it
        // never joined — is the same rejection.
        let doc = self
            .registry
            .room_of(sender)
            .filter(|d| d.as_str() == raw_id)
            .ok_or(RouteError::NotAMember)?;

        let recipients = self.rooms.members_except(&doc, sender);
        let event = build(doc);

        let mut delivered = 0;
        for recipient in recipients {
            // The recipient may have disconnected since the snapshot; a
            // missing queue is skipped, not an error.
            if let Some(queue) = self.registry.queue_of(recipient) {
                if queue.push(event.clone()) {
                    self.stats.record_dropped();
                }
                delivered += 1;
            }
        }
        self.stats.record_routed();
        Ok(delivered)
    }
}
