//! # parley-core
//!
//! Core room-messaging logic for the Parley chat server.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Validation** - Identifier/message validation and HTML-entity sanitization
//! - **RateLimiter** - Fixed-window per-identifier admission control
//! - **RoomRegistry** - Room membership tracking
//! - **MessageStore** - Durable ordered message log contract
//! - **ChatService** - Orchestration of validation, persistence, and broadcast
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌──────────────┐
//! │  Transport  │────▶│ ChatService │────▶│ MessageStore │
//! └─────────────┘     └──────┬──────┘     └──────────────┘
//!                            │
//!                ┌───────────┼───────────┐
//!                ▼           ▼           ▼
//!         ┌───────────┐ ┌─────────┐ ┌──────────┐
//!         │ Validator │ │ Limiter │ │ Registry │
//!         └───────────┘ └─────────┘ └──────────┘
//! ```

pub mod error;
pub mod ratelimit;
pub mod registry;
pub mod service;
pub mod store;
pub mod validate;

pub use error::ChatError;
pub use ratelimit::{RateLimiter, RateLimiterConfig};
pub use registry::{RegistryConfig, RoomRegistry};
pub use service::ChatService;
pub use store::{MemoryStore, MessageStore, StorageError};
