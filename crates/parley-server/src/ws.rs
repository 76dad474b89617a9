//! WebSocket connection handling.
//!
//! Each socket gets a generated connection identity, an outbox registered
//! with the transport hub, and a processing loop that pumps outbox events to
//! the peer and inbound frames into the messaging core.

use crate::handlers::AppState;
use crate::metrics::{self, ConnectionMetricsGuard};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use parley_protocol::{codec, ServerEvent};
use parley_transport::{ChatTransport, ConnectionId};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    // Record connection metrics
    let _metrics_guard = ConnectionMetricsGuard::new();

    let connection_id = ConnectionId::generate();
    debug!(connection = %connection_id, "WebSocket connected");

    let mut outbox = state.hub.register(&connection_id);

    // Split the WebSocket
    let (mut sender, mut receiver) = socket.split();
    let mut close_reason = "client disconnect";

    // Message processing loop
    loop {
        tokio::select! {
            biased;

            // Deliver events queued for this connection
            Some(event) = outbox.recv() => {
                if !forward_event(&mut sender, &connection_id, &event).await {
                    close_reason = "transport error";
                    break;
                }
            }

            // Receive from WebSocket
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_frame(&state, &connection_id, &text).await;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        // Tolerate clients sending text frames as binary
                        match String::from_utf8(data) {
                            Ok(text) => handle_frame(&state, &connection_id, &text).await,
                            Err(_) => {
                                warn!(connection = %connection_id, "Discarding non-UTF-8 frame");
                                metrics::record_error("protocol");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            close_reason = "transport error";
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        // Ignore pongs
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        close_reason = "transport error";
                        break;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    // Exactly one cleanup per connection, whatever ended the loop.
    state.service.disconnect(&connection_id, close_reason).await;
    metrics::set_active_rooms(state.service.registry().room_count());

    debug!(connection = %connection_id, "WebSocket disconnected");
}

/// Decode one inbound frame and hand it to the messaging core.
async fn handle_frame(state: &Arc<AppState>, connection_id: &ConnectionId, text: &str) {
    let start = Instant::now();
    metrics::record_message(text.len(), "inbound");

    match codec::decode(text) {
        Ok(event) => state.service.dispatch(connection_id, event).await,
        Err(e) => {
            warn!(connection = %connection_id, error = %e, "Malformed frame");
            metrics::record_error("protocol");
            if let Err(e) = state
                .hub
                .emit(connection_id, ServerEvent::error("Invalid message format"))
                .await
            {
                warn!(connection = %connection_id, error = %e, "Error reply failed");
            }
        }
    }

    metrics::record_latency(start.elapsed().as_secs_f64());
}

/// Encode and push one outbound event; returns `false` once the socket is gone.
async fn forward_event(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    connection_id: &ConnectionId,
    event: &ServerEvent,
) -> bool {
    match codec::encode(event) {
        Ok(frame) => {
            metrics::record_message(frame.len(), "outbound");
            sender.send(Message::Text(frame)).await.is_ok()
        }
        Err(e) => {
            // An unencodable event is dropped; the connection stays up.
            error!(connection = %connection_id, error = %e, "Encode failed");
            true
        }
    }
}
