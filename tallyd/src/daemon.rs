//! Daemon: Main runtime orchestrator.
//!
//! Ties together the order fetcher, the reconciler, and the HTTP API.
//!
//! # Lifecycle
//!
//! 1. Load configuration
//! 2. Initialize store, classifier, reconciler, order client
//! 3. Start API server
//! 4. Tick loop: one reconciliation cycle per interval (plus ad hoc
//!    cycles via POST /sync)
//! 5. Graceful shutdown on ctrl-c
//!
//! A failed fetch aborts that cycle only; the next tick retries from
//! scratch, and unprocessed orders are re-evaluated thanks to the
//! idempotency guard.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use tally_connectors::OrdersClient;
use tally_engine::{KeywordClassifier, SkuClassifier};
use tally_store::{MemoryStore, Store};

use crate::api::{create_router, ApiState};
use crate::config::Config;
use crate::error::{DaemonError, DaemonResult};
use crate::reconciler::{CycleSummary, Reconciler};

// =============================================================================
// Daemon
// =============================================================================

/// The main tally daemon.
pub struct Daemon<S: Store> {
    /// Configuration
    config: Config,
    /// Durable store
    store: Arc<S>,
    /// Reconciliation service
    reconciler: Arc<Reconciler<S>>,
    /// Order API client
    orders: Arc<OrdersClient>,
}

impl Daemon<MemoryStore> {
    /// Create a daemon on the in-memory store (testing/development).
    pub fn new_memory(config: Config) -> Self {
        Self::new(config, Arc::new(MemoryStore::new()))
    }
}

impl<S: Store> Daemon<S> {
    /// Create a new daemon over the given store.
    pub fn new(config: Config, store: Arc<S>) -> Self {
        let classifier: Arc<dyn SkuClassifier> = Arc::new(KeywordClassifier::new(
            &config.recon.bundle_keywords,
            &config.recon.subcomponent_keywords,
        ));
        let reconciler =
            Arc::new(Reconciler::new(store.clone(), classifier, config.recon.clone()));
        let orders = Arc::new(
            OrdersClient::new(config.orders.base_url.clone(), config.orders.api_key.clone())
                .with_page_size(config.orders.page_size),
        );

        Self { config, store, reconciler, orders }
    }

    /// Run the daemon. Blocks until shutdown is requested (ctrl-c).
    pub async fn run(self) -> DaemonResult<()> {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            environment = %self.config.environment,
            sync_interval_secs = self.config.sync_interval_secs,
            "Starting tally daemon"
        );

        let api_addr = self.start_api_server().await?;
        info!(%api_addr, "API server started");

        let mut ticker =
            tokio::time::interval(Duration::from_secs(self.config.sync_interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        // Cycle failures are logged, never fatal; the next
                        // tick retries and the guard keeps it idempotent.
                        error!(error = %e, "Reconciliation cycle failed");
                    }
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        info!("Shutdown complete");
        Ok(())
    }

    /// Fetch shipped orders and reconcile them once.
    pub async fn run_cycle(&self) -> DaemonResult<CycleSummary> {
        let orders = self.orders.fetch_shipped(self.config.orders.lookback_days).await?;
        Ok(self.reconciler.run_batch(&orders).await)
    }

    /// Start the API server.
    async fn start_api_server(&self) -> DaemonResult<SocketAddr> {
        let state = Arc::new(ApiState {
            store: self.store.clone(),
            reconciler: self.reconciler.clone(),
            orders: self.orders.clone(),
            lookback_days: self.config.orders.lookback_days,
        });

        let router = create_router(state);
        let addr = format!("{}:{}", self.config.api.host, self.config.api.port);

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| DaemonError::Config(format!("Failed to bind to {}: {}", addr, e)))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| DaemonError::Config(format!("Failed to get local address: {}", e)))?;

        // Spawn the server task
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                error!(error = %e, "API server error");
            }
        });

        Ok(local_addr)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_daemon_memory_creation() {
        let daemon = Daemon::new_memory(Config::test());
        assert_eq!(daemon.store.unit_count(), 0);
    }

    #[tokio::test]
    async fn test_daemon_api_server_start() {
        let daemon = Daemon::new_memory(Config::test());

        let addr = daemon.start_api_server().await.unwrap();
        assert!(addr.port() > 0);

        // Can make a health check request
        let client = reqwest::Client::new();
        let response = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .unwrap();

        assert!(response.status().is_success());
    }

    #[tokio::test]
    async fn test_run_cycle_surfaces_fetch_failure() {
        // The test config points the order client at an unroutable
        // address; the cycle must fail whole, not partially.
        let daemon = Daemon::new_memory(Config::test());
        let result = daemon.run_cycle().await;
        assert!(matches!(result, Err(DaemonError::OrdersApi(_))));
    }
}
