//! Reconciliation planning.
//!
//! Pure functions the daemon applies inside a store transaction: the
//! count-reconciliation decision, the FIFO serial-to-line binding walk,
//! and the greedy soft-allocation split.

use crate::demand::OrderDemand;
use crate::EngineError;
use tally_domain::{ProductAvailability, Serial};

// =============================================================================
// Count reconciliation
// =============================================================================

/// Outcome of comparing scanned serial count against expected demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountOutcome {
    /// Scanned count equals expected demand; bind as-is.
    Matched,
    /// All lines are bundles and exactly one serial per ordered unit was
    /// scanned: the second unit of each bundle comes out of the shared
    /// pool. `pool_units` units must be soft-consumed, then demand is
    /// reduced to one serial per unit.
    BundledFallback { pool_units: u32 },
    /// Counts disagree and no fallback applies; route to manual review.
    Mismatch { expected: u32, scanned: u32 },
}

/// Decide how to reconcile scanned serial count against demand.
pub fn reconcile_counts(demand: &OrderDemand, scanned: usize) -> CountOutcome {
    let scanned = scanned as u32;
    if scanned == demand.expected_total {
        CountOutcome::Matched
    } else if demand.all_bundled() && scanned == demand.total_quantity {
        CountOutcome::BundledFallback { pool_units: demand.total_quantity }
    } else {
        CountOutcome::Mismatch { expected: demand.expected_total, scanned }
    }
}

// =============================================================================
// Serial binding
// =============================================================================

/// One serial bound to the SKU of the line that consumed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialBinding {
    pub sku: String,
    pub serial: Serial,
}

/// The full binding walk for an order: bindings in consumption order plus
/// any trailing serials no line claimed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingPlan {
    pub bindings: Vec<SerialBinding>,
    pub unused: Vec<Serial>,
}

/// Walk lines in order, consuming each line's expected count of serials
/// off the front of the scanned list. Ordering is significant: a shuffled
/// walk would bind the wrong serial to the wrong SKU.
///
/// # Errors
/// Returns `EngineError::InsufficientSerials` if the scanned list runs dry
/// mid-walk, which count reconciliation rules out for validated orders.
pub fn plan_bindings(demand: &OrderDemand, serials: &[Serial]) -> Result<BindingPlan, EngineError> {
    let expected: usize = demand.lines.iter().map(|l| l.expected_serials as usize).sum();
    if serials.len() < expected {
        return Err(EngineError::InsufficientSerials { expected, scanned: serials.len() });
    }

    let mut bindings = Vec::with_capacity(expected);
    let mut pointer = serials.iter();
    for line in &demand.lines {
        for _ in 0..line.expected_serials {
            // Length checked above; the pointer cannot run dry.
            if let Some(serial) = pointer.next() {
                bindings.push(SerialBinding { sku: line.sku.clone(), serial: serial.clone() });
            }
        }
    }

    let unused = pointer.cloned().collect();
    Ok(BindingPlan { bindings, unused })
}

// =============================================================================
// Soft allocation
// =============================================================================

/// One additive soft-allocation upsert to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftAllocationStep {
    pub product_id: tally_domain::ProductId,
    pub quantity: i64,
}

/// A greedy split of a needed quantity across pool products, plus whatever
/// could not be placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftAllocationPlan {
    pub steps: Vec<SoftAllocationStep>,
    pub shortfall: i64,
}

impl SoftAllocationPlan {
    /// Quantity the plan actually places.
    pub fn allocated(&self) -> i64 {
        self.steps.iter().map(|s| s.quantity).sum()
    }
}

/// Greedy bin-packing over pool products: drain the product with the most
/// slack first. `available` must already be ranked descending by available
/// quantity (the store query guarantees it); entries with no slack are
/// skipped defensively.
pub fn plan_soft_allocation(needed: i64, available: &[ProductAvailability]) -> SoftAllocationPlan {
    let mut remaining = needed.max(0);
    let mut steps = Vec::new();

    for product in available {
        if remaining <= 0 {
            break;
        }
        if product.available <= 0 {
            continue;
        }
        let take = remaining.min(product.available);
        steps.push(SoftAllocationStep { product_id: product.product_id, quantity: take });
        remaining -= take;
    }

    SoftAllocationPlan { steps, shortfall: remaining }
}

// =============================================================================
// Tests
// =============================================================================
