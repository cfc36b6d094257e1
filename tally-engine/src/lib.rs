//! Tally Engine Layer
//!
//! Pure decision logic, deterministic, no I/O.
//! Takes an order's demand and the store's read models, returns plans for
//! the daemon to apply transactionally:
//!
//! - SKU classification (plain / bundled / sub-component)
//! - Expected-serial demand per line item
//! - Count reconciliation outcome (match, bundled fallback, mismatch)
//! - FIFO serial-to-line binding plan
//! - Greedy soft-allocation plan over pool availability

#![warn(clippy::all)]

pub mod classify;
pub mod demand;
pub mod plan;

pub use classify::{KeywordClassifier, SkuClass, SkuClassifier};
pub use demand::{LineDemand, OrderDemand};
pub use plan::{
    plan_bindings, plan_soft_allocation, reconcile_counts, BindingPlan, CountOutcome,
    SerialBinding, SoftAllocationPlan, SoftAllocationStep,
};

use thiserror::Error;

/// Engine-level errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The binding walk ran out of scanned serials. Count reconciliation
    /// guarantees this cannot happen for a validated order; hitting it
    /// means the demand and the serial list diverged.
    #[error("Ran out of serials while binding: expected {expected}, scanned {scanned}")]
    InsufficientSerials { expected: usize, scanned: usize },
}
