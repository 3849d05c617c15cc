//! # delta-relay — real-time collaboration relay
//!
//! A connection-oriented fan-out server for collaborative document editing:
//! clients join per-document rooms and every edit-delta or cursor-move event
//! is delivered to all other current members of the same room.
//!
//! ```text
//! Client A ──┐                              ┌──► Client B
//!            │   ┌──────────────────────┐   │
//! Client B ──┼──►│ RelayServer          │───┤
//!            │   │  ├─ EventRouter      │   │
//! Client C ──┘   │  ├─ RoomManager      │───┴──► Client C
//!                │  └─ ConnectionRegistry│  (room members except sender)
//!                └──────────────────────┘
//! ```
//!
//! The relay is transport only: deltas and cursor ranges are opaque bytes,
//! never parsed, merged or reordered against other senders. Conflict
//! resolution and document durability belong to the layers around it.
//!
//! ## Modules
//!
//! - [`protocol`] — bincode wire events, document-id validation
//! - [`queue`] — bounded per-connection send queues (drop-oldest)
//! - [`registry`] — connection identities and room pointers
//! - [`rooms`] — room membership, create-on-join / retire-on-empty
//! - [`router`] — join/edit/cursor dispatch, membership enforcement
//! - [`server`] — accept loop, per-connection pumps, idle timeout
//! - [`client`] — relay client for embedders and tests
//!
//! ## Guarantees
//!
//! | Property | Scope |
//! |----------|-------|
//! | Exactly-one delivery per recipient | per membership snapshot |
//! | Sender excluded from its own fan-out | always |
//! | FIFO ordering | per sender-to-recipient pair |
//! | Room exists ⇔ it has members | always |
//! | Bounded memory per connection | drop-oldest send queues |

pub mod client;
pub mod protocol;
pub mod queue;
pub mod registry;
pub mod rooms;
pub mod router;
pub mod server;

// Re-exports for convenience
pub use client::RelayClient;
pub use protocol::{
    ClientEvent, ConnectionId, DocumentId, ProtocolError, RejectReason, ServerEvent,
    MAX_DOCUMENT_ID_LEN,
};
pub use queue::SendQueue;
pub use registry::ConnectionRegistry;
pub use rooms::RoomManager;
pub use router::{EventRouter, RouteError};
pub use server::{RelayServer, RelayStats, ServerConfig, StatsSnapshot};
