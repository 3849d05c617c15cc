//! Binary wire protocol for the relay.
//!
//! One bincode-encoded message per WebSocket binary frame:
//!
//! ```text
//! ┌──────────┬──────────────┬──────────────────┐
//! │ variant  │ document_id  │ payload           │
//! │ tag      │ len-prefixed │ opaque bytes      │
//! └──────────┴──────────────┴──────────────────┘
//! ```
//!
//! The relay never interprets `delta` or `range` payloads — they are carried
//! byte-for-byte from sender to recipients. Outbound events additionally
//! carry the relay-assigned sender token so recipients can attribute the
//! change and route it to the right open document.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Maximum accepted length of a document identifier, in bytes.
pub const MAX_DOCUMENT_ID_LEN: usize = 128;

/// Opaque, relay-assigned connection identity.
///
/// Unique for the lifetime of one connection; doubles as the sender token
/// on outbound events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Allocate a fresh identity. Normally done by the registry as part of
    /// `register`.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated document identifier — the key of a room.
///
/// Well-formed means non-empty, at most [`MAX_DOCUMENT_ID_LEN`] bytes, and
/// ASCII alphanumeric plus `- _ . : /`. This accepts UUIDs as well as
/// human-readable ids like `doc-1` or `org/1f2e…` paths, while rejecting
/// empty, oversized, and control-character ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Validate a raw client-supplied identifier.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.is_empty() || raw.len() > MAX_DOCUMENT_ID_LEN {
            return None;
        }
        let ok = raw
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b':' | b'/'));
        ok.then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Inbound events, client → relay.
///
/// `document_id` is raw and unvalidated here; the router validates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientEvent {
    /// Declare intent to participate in a document's room.
    Join { document_id: String },
    /// An edit made to a document. Sender must already be a member.
    EditDelta { document_id: String, delta: Vec<u8> },
    /// A cursor/selection move. Same membership precondition.
    CursorMove { document_id: String, range: Vec<u8> },
}

/// Why an inbound event was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// Malformed document identifier on join.
    InvalidRoomId,
    /// Edit/cursor event for a room the sender has not joined.
    NotAMember,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRoomId => write!(f, "invalid room id"),
            Self::NotAMember => write!(f, "not a member of the room"),
        }
    }
}

/// Outbound events, relay → client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerEvent {
    /// An edit from another member of the room.
    EditDelta {
        document_id: DocumentId,
        sender: ConnectionId,
        delta: Vec<u8>,
    },
    /// A cursor move from another member of the room.
    CursorMove {
        document_id: DocumentId,
        sender: ConnectionId,
        range: Vec<u8>,
    },
    /// Acknowledgment that the client's own event was rejected.
    /// The connection stays open; no fan-out occurred.
    Rejected { reason: RejectReason },
}

impl ClientEvent {
    /// Serialize to the binary wire format.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Deserialize from the binary wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (event, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| ProtocolError::Decode(e.to_string()))?;
        Ok(event)
    }
}

impl ServerEvent {
    /// Serialize to the binary wire format.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Deserialize from the binary wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (event, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| ProtocolError::Decode(e.to_string()))?;
        Ok(event)
    }
}

/// Protocol-level errors. An undecodable inbound frame closes the offending
/// connection and nothing else.
#[derive(Debug, Clone)]
pub enum ProtocolError {
    Encode(String),
    Decode(String),
    ConnectionClosed,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encode(e) => write!(f, "encode error: {e}"),
            Self::Decode(e) => write!(f, "decode error: {e}"),
            Self::ConnectionClosed => write!(f, "connection closed"),
        }
    }
}

impl std::error::Error for ProtocolError {}
