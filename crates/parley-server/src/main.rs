//! # Parley Server
//!
//! Room-scoped real-time chat server.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! parley
//!
//! # Run with environment variables
//! PARLEY_PORT=8080 PARLEY_HOST=0.0.0.0 parley
//! ```

mod config;
mod handlers;
mod http;
mod metrics;
mod ws;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!("Starting Parley server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
