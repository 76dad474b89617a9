//! Room-scoped REST endpoints.
//!
//! The same messaging core backs these routes, so a message submitted over
//! HTTP is persisted and broadcast to connected room members exactly like a
//! real-time send.

use crate::handlers::AppState;
use crate::metrics;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use parley_core::ChatError;
use parley_protocol::ChatMessage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Body for `POST /rooms/{roomId}/messages`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostMessageBody {
    sender_id: Option<String>,
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreatedBody {
    success: bool,
    data: ChatMessage,
}

#[derive(Debug, Serialize)]
struct HistoryBody {
    success: bool,
    data: Vec<ChatMessage>,
    count: usize,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

/// Submit a message to a room.
pub async fn post_message(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    body: Option<Json<PostMessageBody>>,
) -> Response {
    // A missing or malformed body falls through to field validation.
    let body = body.map(|Json(b)| b).unwrap_or_default();

    match state
        .service
        .submit_message(
            None,
            Some(&room_id),
            body.sender_id.as_deref(),
            body.content.as_deref(),
        )
        .await
    {
        Ok(message) => (
            StatusCode::CREATED,
            Json(CreatedBody {
                success: true,
                data: message,
            }),
        )
            .into_response(),
        Err(e) => error_response(&e, "Failed to send message"),
    }
}

/// Read paginated message history for a room.
pub async fn get_messages(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    // Raw query strings so pagination keeps its permissive integer parsing.
    let limit = params.get("limit").cloned().map(Value::String);
    let offset = params.get("offset").cloned().map(Value::String);

    match state
        .service
        .history(Some(&room_id), limit.as_ref(), offset.as_ref())
        .await
    {
        Ok((_, messages)) => {
            let count = messages.len();
            (
                StatusCode::OK,
                Json(HistoryBody {
                    success: true,
                    data: messages,
                    count,
                }),
            )
                .into_response()
        }
        Err(e) => error_response(&e, "Failed to retrieve messages"),
    }
}

fn error_response(err: &ChatError, generic: &str) -> Response {
    let (status, message) = match err {
        ChatError::Validation(reason) => (StatusCode::BAD_REQUEST, (*reason).to_string()),
        ChatError::RateLimited => {
            metrics::record_rate_limited();
            (StatusCode::TOO_MANY_REQUESTS, err.to_string())
        }
        // Storage internals are logged at the core, never exposed here.
        ChatError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, generic.to_string()),
    };

    (
        status,
        Json(ErrorBody {
            success: false,
            error: message,
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::StorageError;

    #[test]
    fn test_error_response_status_mapping() {
        let validation = error_response(&ChatError::Validation("Room ID is required"), "generic");
        assert_eq!(validation.status(), StatusCode::BAD_REQUEST);

        let limited = error_response(&ChatError::RateLimited, "generic");
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);

        let storage = error_response(
            &ChatError::Storage(StorageError::Unavailable("down".into())),
            "generic",
        );
        assert_eq!(storage.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
