//! # parley-protocol
//!
//! Wire protocol definitions for the Parley chat server.
//!
//! This crate defines the JSON event protocol exchanged between chat clients
//! and the server: event types, payload shapes, and the codec.
//!
//! ## Event Names
//!
//! - `chat:join` / `chat:leave` - Room membership
//! - `chat:send` / `chat:receive` - Message delivery
//! - `chat:getHistory` / `chat:history` - Paginated message history
//! - `chat:typing` / `chat:userTyping` - Typing presence
//! - `chat:error` - Error replies
//!
//! ## Example
//!
//! ```rust
//! use parley_protocol::{codec, ClientEvent};
//!
//! let frame = r#"{"event":"chat:join","data":{"roomId":"lobby","userId":"alice"}}"#;
//! let event = codec::decode(frame).unwrap();
//! assert!(matches!(event, ClientEvent::Join { .. }));
//! ```

pub mod codec;
pub mod events;

pub use codec::{decode, encode, ProtocolError};
pub use events::{ChatMessage, ClientEvent, ServerEvent};
