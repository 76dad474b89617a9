//! # parley-transport
//!
//! Connection identity and event delivery for the Parley chat server.
//!
//! This crate defines the interface the messaging core uses to reach
//! connected clients, keeping the core transport-agnostic:
//!
//! - **ConnectionId** - Opaque identity assigned at connect time
//! - **ChatTransport** - Per-connection emit and room broadcast primitives
//! - **TransportHub** - In-process implementation backed by per-connection
//!   outbox channels

pub mod hub;
pub mod traits;

pub use hub::TransportHub;
pub use traits::{ChatTransport, ConnectionId, TransportError};
