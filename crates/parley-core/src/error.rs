//! Error taxonomy for the messaging core.

use crate::store::StorageError;
use thiserror::Error;

/// Chat operation errors.
///
/// Validation and rate-limit failures are terminal at the handler boundary
/// and never reach storage. Storage failures are converted to a generic
/// user-facing message at the call site; the cause is logged, not exposed.
/// Transport delivery failures are not represented here at all: they are
/// logged and swallowed, since the caller already received its ack or error.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Bad, missing, or oversized input. The reason is shown to the caller
    /// verbatim.
    #[error("{0}")]
    Validation(&'static str),

    /// The caller exceeded its admission window. The request is dropped
    /// with no side effects.
    #[error("Rate limit exceeded. Please slow down.")]
    RateLimited,

    /// The persistence layer failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_reason_is_verbatim() {
        let err = ChatError::Validation("Room ID is required");
        assert_eq!(err.to_string(), "Room ID is required");
    }

    #[test]
    fn test_storage_errors_convert() {
        let err: ChatError = StorageError::Unavailable("connection reset".into()).into();
        assert!(matches!(err, ChatError::Storage(_)));
    }
}
