//! Tally Storage Layer
//!
//! Persistence for units, sale log entries, soft allocations, manual
//! review rows, and return records.
//!
//! # Architecture
//!
//! - **`Store` / `StoreTx` traits**: the storage port. Every mutation runs
//!   through an explicit transaction object; dropping an uncommitted
//!   transaction rolls it back, which is what gives the reconciler its
//!   all-or-nothing-per-order guarantee.
//! - **In-memory store**: fast implementation for tests and development.
//! - **PostgreSQL store**: production implementation (feature `postgres`).

#![warn(clippy::all)]

mod error;
mod memory;
#[cfg(feature = "postgres")]
mod postgres;
mod repository;

pub use error::StoreError;
pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgStore;
pub use repository::{Store, StoreTx};
