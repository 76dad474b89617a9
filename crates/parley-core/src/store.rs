//! Message persistence contract and the in-memory engine.
//!
//! The store is an ordered, durable, append-only log of messages keyed by
//! room. The messaging core depends only on the `MessageStore` trait; the
//! in-memory engine backs single-process deployments and the test suite.

use async_trait::async_trait;
use dashmap::DashMap;
use parley_protocol::ChatMessage;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The persistence engine could not be reached or rejected the write.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// A stored record could not be read back intact.
    #[error("Corrupt record: {0}")]
    Corrupted(String),
}

/// Durable ordered message log, keyed by room.
///
/// `append` assigns the message identifier and timestamp; within a room,
/// earlier appends receive identifiers and timestamps that sort earlier.
/// `range` reads whole records only, ascending by creation time.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message, assigning its identifier and timestamp.
    async fn append(
        &self,
        room_id: &str,
        sender_id: &str,
        content: &str,
    ) -> Result<ChatMessage, StorageError>;

    /// Read up to `limit` messages for a room in ascending creation order,
    /// skipping the `offset` earliest.
    async fn range(
        &self,
        room_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ChatMessage>, StorageError>;
}

/// In-memory message log.
pub struct MemoryStore {
    /// Per-room append-order logs.
    rooms: DashMap<String, Vec<ChatMessage>>,
    /// Identifier sequence, shared across rooms.
    next_id: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Total messages across all rooms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rooms.iter().map(|log| log.len()).sum()
    }

    /// Whether the store holds no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rooms.iter().all(|log| log.is_empty())
    }

    fn now_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn append(
        &self,
        room_id: &str,
        sender_id: &str,
        content: &str,
    ) -> Result<ChatMessage, StorageError> {
        let mut log = self.rooms.entry(room_id.to_string()).or_default();

        // Id assignment and timestamp clamping happen under the room's entry
        // lock, so per-room order is total and timestamps never regress.
        let last = log.last().map(|m| m.timestamp).unwrap_or(0);
        let message = ChatMessage {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            room_id: room_id.to_string(),
            sender_id: sender_id.to_string(),
            content: content.to_string(),
            timestamp: Self::now_ms().max(last),
        };

        log.push(message.clone());
        Ok(message)
    }

    async fn range(
        &self,
        room_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ChatMessage>, StorageError> {
        let messages = self
            .rooms
            .get(room_id)
            .map(|log| log.iter().skip(offset).take(limit).cloned().collect())
            .unwrap_or_default();
        Ok(messages)
    }
}
