//! # Agora Server
//!
//! Realtime connection hub for the Agora forum.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! agora
//!
//! # Run with a specific config file
//! AGORA_CONFIG=/path/to/agora.toml agora
//!
//! # Run with environment variables
//! AGORA_PORT=8080 AGORA_HOST=0.0.0.0 agora
//! ```

mod config;
mod handlers;
mod metrics;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agora=debug,agora_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!("Starting Agora server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    tracing::info!("Agora server stopped");
    Ok(())
}
