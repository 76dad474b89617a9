//! In-process transport hub.
//!
//! The hub owns one outbox channel per connection and the room-group
//! membership used for fan-out. The server-side socket loop drains each
//! outbox into the actual WebSocket.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use parley_protocol::ServerEvent;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::traits::{ChatTransport, ConnectionId, TransportError};

/// In-process event delivery backed by per-connection mpsc outboxes.
#[derive(Default)]
pub struct TransportHub {
    /// Outbound channel per registered connection.
    outboxes: DashMap<ConnectionId, mpsc::UnboundedSender<ServerEvent>>,
    /// Room group membership (room -> connection IDs).
    groups: DashMap<String, DashSet<ConnectionId>>,
    /// Reverse membership (connection -> rooms), kept in step with `groups`.
    memberships: DashMap<ConnectionId, DashSet<String>>,
}

impl TransportHub {
    /// Create a new hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and return the receiving end of its outbox.
    ///
    /// Registering an ID again replaces the previous outbox; the old
    /// receiver closes.
    pub fn register(&self, connection_id: &ConnectionId) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.outboxes.insert(connection_id.clone(), tx);
        debug!(connection = %connection_id, "Connection registered");
        rx
    }

    /// Get the number of registered connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.outboxes.len()
    }

    /// Get the number of members in a room group.
    #[must_use]
    pub fn group_size(&self, room: &str) -> usize {
        self.groups.get(room).map(|g| g.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ChatTransport for TransportHub {
    async fn emit(&self, target: &ConnectionId, event: ServerEvent) -> Result<(), TransportError> {
        let Some(outbox) = self.outboxes.get(target) else {
            return Err(TransportError::ConnectionClosed);
        };

        outbox
            .send(event)
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn broadcast_to_room(
        &self,
        room: &str,
        event: ServerEvent,
        exclude: Option<&ConnectionId>,
    ) -> usize {
        // Snapshot the membership before delivering anything.
        let members: Vec<ConnectionId> = match self.groups.get(room) {
            Some(group) => group
                .iter()
                .filter(|m| exclude != Some(m.key()))
                .map(|m| m.key().clone())
                .collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for member in &members {
            if let Some(outbox) = self.outboxes.get(member) {
                // Dead outbox means the connection is tearing down; skip it.
                if outbox.send(event.clone()).is_ok() {
                    delivered += 1;
                }
            }
        }

        trace!(room = %room, recipients = delivered, event = event.name(), "Broadcast");
        delivered
    }

    fn join_group(&self, connection_id: &ConnectionId, room: &str) {
        self.groups
            .entry(room.to_string())
            .or_default()
            .insert(connection_id.clone());
        self.memberships
            .entry(connection_id.clone())
            .or_default()
            .insert(room.to_string());
    }

    fn leave_group(&self, connection_id: &ConnectionId, room: &str) {
        if let Some(group) = self.groups.get_mut(room) {
            group.remove(connection_id);
            if group.is_empty() {
                drop(group);
                self.groups.remove(room);
            }
        }
        if let Some(rooms) = self.memberships.get(connection_id) {
            rooms.remove(room);
        }
    }

    fn remove_connection(&self, connection_id: &ConnectionId) {
        if let Some((_, rooms)) = self.memberships.remove(connection_id) {
            for room in rooms.iter() {
                if let Some(group) = self.groups.get_mut(room.key()) {
                    group.remove(connection_id);
                    if group.is_empty() {
                        let name = room.key().clone();
                        drop(group);
                        self.groups.remove(&name);
                    }
                }
            }
        }

        self.outboxes.remove(connection_id);
        debug!(connection = %connection_id, "Connection removed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_reaches_registered_connection() {
        let hub = TransportHub::new();
        let conn = ConnectionId::new("conn-1");
        let mut rx = hub.register(&conn);

        hub.emit(&conn, ServerEvent::joined("r1")).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "chat:joined");
    }

    #[tokio::test]
    async fn test_emit_unknown_connection_fails() {
        let hub = TransportHub::new();
        let result = hub
            .emit(&ConnectionId::new("ghost"), ServerEvent::joined("r1"))
            .await;
        assert!(matches!(result, Err(TransportError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_broadcast_excludes_sender() {
        let hub = TransportHub::new();
        let a = ConnectionId::new("a");
        let b = ConnectionId::new("b");
        let mut rx_a = hub.register(&a);
        let mut rx_b = hub.register(&b);

        hub.join_group(&a, "r1");
        hub.join_group(&b, "r1");

        let count = hub
            .broadcast_to_room("r1", ServerEvent::left("r1"), Some(&a))
            .await;
        assert_eq!(count, 1);
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_broadcast_unknown_room_is_empty() {
        let hub = TransportHub::new();
        let count = hub
            .broadcast_to_room("nowhere", ServerEvent::left("nowhere"), None)
            .await;
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_remove_connection_clears_groups() {
        let hub = TransportHub::new();
        let a = ConnectionId::new("a");
        let _rx = hub.register(&a);

        hub.join_group(&a, "r1");
        hub.join_group(&a, "r2");
        assert_eq!(hub.group_size("r1"), 1);

        hub.remove_connection(&a);
        assert_eq!(hub.group_size("r1"), 0);
        assert_eq!(hub.group_size("r2"), 0);
        assert_eq!(hub.connection_count(), 0);
    }
}
