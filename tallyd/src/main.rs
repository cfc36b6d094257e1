//! Tally Daemon
//!
//! Runtime orchestrator for order-to-serial reconciliation.
//!
//! # Usage
//!
//! ```bash
//! # Start with default configuration (in-memory store)
//! cargo run -p tallyd
//!
//! # Against PostgreSQL
//! DATABASE_URL=postgres://... cargo run -p tallyd --features postgres
//! ```
//!
//! # Environment Variables
//!
//! - `TALLY_ENV`: Environment (test, development, production)
//! - `TALLY_API_HOST` / `TALLY_API_PORT`: API bind address
//! - `TALLY_ORDERS_URL` / `TALLY_ORDERS_API_KEY`: order API access (required)
//! - `TALLY_LOOKBACK_DAYS`: fetch window (default: 7)
//! - `TALLY_SYNC_INTERVAL_SECS`: cycle cadence (default: 60)
//! - `TALLY_CUTOFF_DATE`: sub-component accounting go-live (RFC 3339)
//! - `TALLY_BUNDLE_KEYWORDS` / `TALLY_SUBCOMPONENT_KEYWORDS`: SKU matching
//! - `TALLY_BUNDLE_POOL` / `TALLY_SUBCOMPONENT_POOL` / `TALLY_SUBCOMPONENT_SKU`
//! - `DATABASE_URL`: PostgreSQL store (memory store when absent)

use tallyd::{Config, Daemon};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("tallyd=info".parse()?))
        .init();

    // Load configuration
    let config = Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        api_host = %config.api.host,
        api_port = config.api.port,
        "Tally Daemon"
    );

    match config.database_url.clone() {
        #[cfg(feature = "postgres")]
        Some(url) => {
            use std::sync::Arc;
            use tally_store::PgStore;

            let store = PgStore::connect(&url).await?;
            store.migrate().await?;
            info!("Connected to PostgreSQL store");

            Daemon::new(config, Arc::new(store)).run().await?;
        },
        _ => {
            info!("Using in-memory store");
            Daemon::new_memory(config).run().await?;
        },
    }

    Ok(())
}
