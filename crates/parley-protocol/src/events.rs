//! Event types for the Parley chat protocol.
//!
//! Events are the messages exchanged between clients and the server.
//! Each frame is a JSON object of the form `{"event": "...", "data": {...}}`
//! with camelCase payload keys.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A persisted chat message.
///
/// The identifier and timestamp are assigned by the message store at persist
/// time; timestamps are milliseconds since the Unix epoch and non-decreasing
/// within a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Store-assigned message identifier.
    pub id: u64,
    /// Room the message was sent to.
    pub room_id: String,
    /// Sender identifier (a label, not an authenticated principal).
    pub sender_id: String,
    /// Sanitized message text.
    pub content: String,
    /// Persist-time timestamp in milliseconds since the Unix epoch.
    pub timestamp: u64,
}

/// Events sent by clients.
///
/// Payload fields are optional at the wire level; presence and shape are
/// validated by the messaging core so that a missing field produces a chat
/// error rather than a decode failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Join a room.
    #[serde(rename = "chat:join", rename_all = "camelCase")]
    Join {
        room_id: Option<String>,
        user_id: Option<String>,
    },

    /// Send a message to a room.
    #[serde(rename = "chat:send", rename_all = "camelCase")]
    Send {
        room_id: Option<String>,
        user_id: Option<String>,
        message: Option<String>,
    },

    /// Request paginated message history for a room.
    #[serde(rename = "chat:getHistory", rename_all = "camelCase")]
    GetHistory {
        room_id: Option<String>,
        /// Raw pagination values; coerced permissively by the validator.
        limit: Option<Value>,
        offset: Option<Value>,
    },

    /// Leave a room.
    #[serde(rename = "chat:leave", rename_all = "camelCase")]
    Leave {
        room_id: Option<String>,
        user_id: Option<String>,
    },

    /// Report typing state to a room.
    #[serde(rename = "chat:typing", rename_all = "camelCase")]
    Typing {
        room_id: Option<String>,
        user_id: Option<String>,
        /// Coerced to a boolean by truthiness.
        is_typing: Option<Value>,
    },
}

impl ClientEvent {
    /// Get the wire event name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Join { .. } => "chat:join",
            ClientEvent::Send { .. } => "chat:send",
            ClientEvent::GetHistory { .. } => "chat:getHistory",
            ClientEvent::Leave { .. } => "chat:leave",
            ClientEvent::Typing { .. } => "chat:typing",
        }
    }
}

/// Events sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Acknowledge a join to the caller.
    #[serde(rename = "chat:joined", rename_all = "camelCase")]
    Joined { room_id: String },

    /// Notify room members that a user joined.
    #[serde(rename = "chat:userJoined", rename_all = "camelCase")]
    UserJoined {
        room_id: String,
        user_id: String,
        connection_id: String,
    },

    /// Deliver a persisted message to room members.
    #[serde(rename = "chat:receive", rename_all = "camelCase")]
    Receive {
        #[serde(flatten)]
        message: ChatMessage,
        /// Originating connection, absent for messages submitted over HTTP.
        #[serde(skip_serializing_if = "Option::is_none")]
        connection_id: Option<String>,
    },

    /// Reply to a history request.
    #[serde(rename = "chat:history", rename_all = "camelCase")]
    History {
        room_id: String,
        messages: Vec<ChatMessage>,
        count: usize,
    },

    /// Acknowledge a leave to the caller.
    #[serde(rename = "chat:left", rename_all = "camelCase")]
    Left { room_id: String },

    /// Notify room members that a user left.
    #[serde(rename = "chat:userLeft", rename_all = "camelCase")]
    UserLeft { room_id: String, user_id: String },

    /// Notify room members of a typing state change.
    #[serde(rename = "chat:userTyping", rename_all = "camelCase")]
    UserTyping {
        room_id: String,
        user_id: String,
        is_typing: bool,
    },

    /// Notify room members that a connection dropped.
    #[serde(rename = "chat:userDisconnected", rename_all = "camelCase")]
    UserDisconnected {
        room_id: String,
        connection_id: String,
        reason: String,
    },

    /// Error reply, delivered to the caller only.
    #[serde(rename = "chat:error", rename_all = "camelCase")]
    Error { message: String },
}

impl ServerEvent {
    /// Get the wire event name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Joined { .. } => "chat:joined",
            ServerEvent::UserJoined { .. } => "chat:userJoined",
            ServerEvent::Receive { .. } => "chat:receive",
            ServerEvent::History { .. } => "chat:history",
            ServerEvent::Left { .. } => "chat:left",
            ServerEvent::UserLeft { .. } => "chat:userLeft",
            ServerEvent::UserTyping { .. } => "chat:userTyping",
            ServerEvent::UserDisconnected { .. } => "chat:userDisconnected",
            ServerEvent::Error { .. } => "chat:error",
        }
    }

    /// Create an error event.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }

    /// Create a join acknowledgment.
    #[must_use]
    pub fn joined(room_id: impl Into<String>) -> Self {
        ServerEvent::Joined {
            room_id: room_id.into(),
        }
    }

    /// Create a leave acknowledgment.
    #[must_use]
    pub fn left(room_id: impl Into<String>) -> Self {
        ServerEvent::Left {
            room_id: room_id.into(),
        }
    }

    /// Create a message delivery event.
    #[must_use]
    pub fn receive(message: ChatMessage, connection_id: Option<String>) -> Self {
        ServerEvent::Receive {
            message,
            connection_id,
        }
    }

    /// Create a history reply.
    #[must_use]
    pub fn history(room_id: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        let count = messages.len();
        ServerEvent::History {
            room_id: room_id.into(),
            messages,
            count,
        }
    }
}
