//! Codec for encoding and decoding Parley event frames.
//!
//! Frames are JSON text of the form `{"event": "...", "data": {...}}`.

use thiserror::Error;

use crate::events::{ClientEvent, ServerEvent};

/// Maximum frame size in bytes (64 KiB).
pub const MAX_EVENT_SIZE: usize = 64 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {MAX_EVENT_SIZE}")]
    FrameTooLarge(usize),

    /// JSON encoding/decoding error.
    #[error("Invalid frame: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encode a server event to a JSON frame.
///
/// # Errors
///
/// Returns an error if the frame is too large or encoding fails.
pub fn encode(event: &ServerEvent) -> Result<String, ProtocolError> {
    let frame = serde_json::to_string(event)?;

    if frame.len() > MAX_EVENT_SIZE {
        return Err(ProtocolError::FrameTooLarge(frame.len()));
    }

    Ok(frame)
}

/// Decode a client event from a JSON frame.
///
/// # Errors
///
/// Returns an error if the frame is too large, malformed, or names an
/// unknown event.
pub fn decode(frame: &str) -> Result<ClientEvent, ProtocolError> {
    if frame.len() > MAX_EVENT_SIZE {
        return Err(ProtocolError::FrameTooLarge(frame.len()));
    }

    let event = serde_json::from_str(frame)?;
    Ok(event)
}
