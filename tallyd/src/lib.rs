//! Tally Daemon Library
//!
//! Runtime orchestrator for the inventory reconciliation engine.
//!
//! # Architecture
//!
//! ```text
//! Scheduler tick ──► Order Fetcher ──► Reconciler ──► Store (one tx per order)
//!                                          │
//!                                          ├─ Unit sold flags + inventory log
//!                                          ├─ Soft allocation ledger
//!                                          └─ Manual review queue
//!
//! HTTP API ──► sync-now / returns / reviews / unit operations
//! ```
//!
//! # Components
//!
//! - **Daemon**: runtime loop (interval ticks + graceful shutdown)
//! - **Reconciler**: the per-order state machine
//! - **Returns**: return-scan processing
//! - **Manual**: operator-triggered unit and review operations
//! - **API**: HTTP endpoints
//! - **Config**: environment-based configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use tallyd::{Config, Daemon};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("Failed to load config");
//!     let daemon = Daemon::new_memory(config);
//!     daemon.run().await.expect("Daemon error");
//! }
//! ```

#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod daemon;
pub mod error;
pub mod manual;
pub mod reconciler;
pub mod returns;

// Re-exports for convenience
pub use config::{ApiConfig, Config, Environment, OrdersConfig, ReconConfig};
pub use daemon::Daemon;
pub use error::{DaemonError, DaemonResult};
pub use reconciler::{CycleSummary, OrderOutcome, Reconciler, ReviewReason};
pub use returns::process_return;
