//! Room membership registry for Parley.
//!
//! The registry is the authoritative mapping of room -> member connections
//! and connection -> joined rooms, kept mutually consistent.

use dashmap::{DashMap, DashSet};
use parley_transport::ConnectionId;
use tracing::debug;

/// Registry configuration.
#[derive(Debug, Clone, Default)]
pub struct RegistryConfig {
    /// Remove a room's entry once its last member leaves. Off by default:
    /// empty rooms are left dangling, matching the historical behavior.
    pub evict_empty_rooms: bool,
}

/// Room membership tracking.
pub struct RoomRegistry {
    /// Rooms indexed by identifier.
    rooms: DashMap<String, DashSet<ConnectionId>>,
    /// Connection memberships (connection -> set of room identifiers).
    connections: DashMap<ConnectionId, DashSet<String>>,
    config: RegistryConfig,
}

impl RoomRegistry {
    /// Create a registry with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a registry with custom configuration.
    #[must_use]
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            rooms: DashMap::new(),
            connections: DashMap::new(),
            config,
        }
    }

    /// Add a connection to a room, creating the room if absent.
    ///
    /// Idempotent: joining a room twice is a no-op that still succeeds.
    pub fn join(&self, connection_id: &ConnectionId, room: &str) {
        self.rooms
            .entry(room.to_string())
            .or_default()
            .insert(connection_id.clone());
        self.connections
            .entry(connection_id.clone())
            .or_default()
            .insert(room.to_string());

        debug!(room = %room, connection = %connection_id, "Joined room");
    }

    /// Remove a connection from a room.
    ///
    /// Idempotent: removing an absent member is a no-op.
    pub fn leave(&self, connection_id: &ConnectionId, room: &str) {
        if let Some(members) = self.rooms.get_mut(room) {
            members.remove(connection_id);
            if self.config.evict_empty_rooms && members.is_empty() {
                drop(members);
                self.rooms.remove(room);
                debug!(room = %room, "Evicted empty room");
            }
        }
        if let Some(rooms) = self.connections.get(connection_id) {
            rooms.remove(room);
        }

        debug!(room = %room, connection = %connection_id, "Left room");
    }

    /// Remove a connection from every room it had joined.
    ///
    /// Returns the identifiers of the rooms it was a member of, so the
    /// caller can notify each.
    pub fn remove_connection(&self, connection_id: &ConnectionId) -> Vec<String> {
        let Some((_, rooms)) = self.connections.remove(connection_id) else {
            return Vec::new();
        };

        let mut affected = Vec::with_capacity(rooms.len());
        for room in rooms.iter() {
            if let Some(members) = self.rooms.get_mut(room.key()) {
                if members.remove(connection_id).is_some() {
                    affected.push(room.key().clone());
                }
                if self.config.evict_empty_rooms && members.is_empty() {
                    let name = room.key().clone();
                    drop(members);
                    self.rooms.remove(&name);
                }
            }
        }

        debug!(connection = %connection_id, rooms = affected.len(), "Removed connection");
        affected
    }

    /// Get the current members of a room, or empty if the room is unknown.
    #[must_use]
    pub fn members_of(&self, room: &str) -> Vec<ConnectionId> {
        self.rooms
            .get(room)
            .map(|members| members.iter().map(|m| m.key().clone()).collect())
            .unwrap_or_default()
    }

    /// Get the number of members in a room.
    #[must_use]
    pub fn member_count(&self, room: &str) -> usize {
        self.rooms.get(room).map(|m| m.len()).unwrap_or(0)
    }

    /// Get the rooms a connection has joined.
    #[must_use]
    pub fn rooms_of(&self, connection_id: &ConnectionId) -> Vec<String> {
        self.connections
            .get(connection_id)
            .map(|rooms| rooms.iter().map(|r| r.key().clone()).collect())
            .unwrap_or_default()
    }

    /// Get the number of rooms currently tracked, empty ones included.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
