//! Server wiring and shared state.
//!
//! Builds the messaging core from configuration and mounts the WebSocket
//! and REST surfaces on one axum router.

use crate::config::Config;
use crate::{http, metrics, ws};
use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use parley_core::{
    ChatService, MemoryStore, MessageStore, RateLimiter, RateLimiterConfig, RegistryConfig,
    RoomRegistry,
};
use parley_transport::{ChatTransport, TransportHub};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Shared server state.
pub struct AppState {
    /// The messaging core.
    pub service: ChatService,
    /// The in-process delivery hub, shared with the service.
    pub hub: Arc<TransportHub>,
}

impl AppState {
    /// Create new app state, wiring the core from configuration.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let hub = Arc::new(TransportHub::new());

        let registry = RoomRegistry::with_config(RegistryConfig {
            evict_empty_rooms: config.limits.evict_empty_rooms,
        });
        let limiter = RateLimiter::with_config(RateLimiterConfig {
            max_requests: config.limits.rate_limit_max_requests,
            window: Duration::from_millis(config.limits.rate_limit_window_ms),
        });
        let store: Arc<dyn MessageStore> = Arc::new(MemoryStore::new());

        let service = ChatService::new(
            registry,
            limiter,
            store,
            Arc::clone(&hub) as Arc<dyn ChatTransport>,
        );

        Self { service, hub }
    }
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let state = Arc::new(AppState::new(&config));

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    // Build router
    let app = Router::new()
        .route(&config.transport.websocket_path, get(ws::ws_handler))
        .route("/health", get(health_handler))
        .route(
            "/rooms/:room_id/messages",
            post(http::post_message).get(http::get_messages),
        )
        .layer(DefaultBodyLimit::max(config.limits.max_body_bytes))
        .with_state(state);

    // Bind and serve
    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Parley server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
