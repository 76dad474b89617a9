//! Transport abstraction for Parley.
//!
//! The `ChatTransport` trait defines the delivery primitives the messaging
//! core depends on, allowing the core to stay transport-agnostic.

use async_trait::async_trait;
use parley_protocol::{ProtocolError, ServerEvent};
use std::fmt;
use thiserror::Error;

/// Unique identifier for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Create a new connection ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a random connection ID.
    #[must_use]
    pub fn generate() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        Self(format!("conn_{:x}", timestamp))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed or is not registered.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Failed to deliver an event.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// The delivery interface the messaging core uses to reach clients.
///
/// Implementations own the mapping from connection identity to an actual
/// outbound channel, plus the room-group membership the fan-out mechanism
/// needs. Delivery failures are transport-level only: callers log them and
/// continue, they are never surfaced as chat errors.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Deliver an event to a single connection.
    async fn emit(&self, target: &ConnectionId, event: ServerEvent) -> Result<(), TransportError>;

    /// Deliver an event to every current member of a room group, optionally
    /// excluding one connection.
    ///
    /// Membership is snapshotted when the call starts; a connection joining
    /// mid-broadcast is not guaranteed delivery. Returns the number of
    /// recipients the event was handed to.
    async fn broadcast_to_room(
        &self,
        room: &str,
        event: ServerEvent,
        exclude: Option<&ConnectionId>,
    ) -> usize;

    /// Add a connection to a room group.
    fn join_group(&self, connection_id: &ConnectionId, room: &str);

    /// Remove a connection from a room group.
    fn leave_group(&self, connection_id: &ConnectionId, room: &str);

    /// Remove a connection from every group and drop its outbound channel.
    fn remove_connection(&self, connection_id: &ConnectionId);
}
