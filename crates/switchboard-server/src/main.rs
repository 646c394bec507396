//! # Switchboard Server
//!
//! Real-time relay: broadcast fan-out plus directed peer signaling.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! switchboard
//!
//! # Run with custom config
//! switchboard  # reads switchboard.toml from the usual locations
//!
//! # Run with environment variables
//! SWITCHBOARD_PORT=9400 SWITCHBOARD_HOST=0.0.0.0 switchboard
//! ```

use anyhow::Result;
use switchboard_server::{config, handlers, metrics};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "switchboard=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!("Starting Switchboard on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Run until shutdown
    handlers::run_server(config).await?;

    Ok(())
}
