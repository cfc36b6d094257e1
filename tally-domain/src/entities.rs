//! Domain Entities for Tally
//!
//! Stored rows and the read models the reconciliation engine plans
//! against. All of these are owned by the single transactional store;
//! identity is assigned on insert.

use crate::value_objects::Serial;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for an inventory unit
pub type UnitId = i64;

/// Unique identifier for a product (catalog row)
pub type ProductId = i64;

/// Identifier of an operator performing a manual action
pub type UserId = i64;

/// Identifier of a shared sub-component pool (which fungible resource a
/// product's units provision)
pub type PoolId = i32;

// =============================================================================
// Product
// =============================================================================

/// Catalog row. `master_sku_id` groups part numbers that are substitutable
/// for fulfillment; `pool_id` marks products whose units provision a shared
/// sub-component pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub product_id: ProductId,
    pub part_number: String,
    pub product_name: String,
    pub master_sku_id: String,
    pub pool_id: Option<PoolId>,
}

// =============================================================================
// InventoryUnit
// =============================================================================

/// One physical serialized item.
///
/// # Invariants
/// - A real (non-sentinel) serial is globally unique among units
/// - `sold == true` requires a real serial
/// - `sn_prefix`, when set, constrains any serial later assigned
/// - `disposed` is terminal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryUnit {
    pub unit_id: UnitId,
    pub product_id: ProductId,
    pub serial: Serial,
    pub sold: bool,
    pub is_damaged: bool,
    pub disposed: bool,
    pub po_number: String,
    pub sn_prefix: Option<String>,
    pub serial_assigned_at: DateTime<Utc>,
    pub assigned_by: Option<UserId>,
}

impl InventoryUnit {
    /// Whether the unit has been serial-tagged.
    pub fn has_serial(&self) -> bool {
        !self.serial.is_sentinel()
    }

    /// Whether the unit is eligible for allocation to a sale: tagged,
    /// unsold, undamaged, and not disposed.
    pub fn is_sellable(&self) -> bool {
        self.has_serial() && !self.sold && !self.is_damaged && !self.disposed
    }
}

// =============================================================================
// InventoryLogEntry
// =============================================================================

/// Append-only audit record of "this serial was sold under this order".
/// Conflict key is (serial, order_id): re-inserting the same pair is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub sku: String,
    pub serial: Serial,
    pub order_id: String,
    pub event_time: DateTime<Utc>,
}

// =============================================================================
// SoftAllocation
// =============================================================================

/// A claim of N fungible units of a product against an order, with no
/// dedicated serial. Keyed by (product_id, order_id); repeated allocation
/// for the same key adds to the quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftAllocation {
    pub product_id: ProductId,
    pub order_id: String,
    pub quantity: i64,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Manual review
// =============================================================================

/// A review row pending insertion. The store assigns `review_id` and keeps
/// at most one unresolved row per (order_id, sku).
#[derive(Debug, Clone)]
pub struct NewReviewItem {
    pub order_id: String,
    pub sku: String,
    pub reason: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl NewReviewItem {
    /// A plain review row with no reason or diagnostics attached.
    pub fn new(order_id: impl Into<String>, sku: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            order_id: order_id.into(),
            sku: sku.into(),
            reason: None,
            metadata: None,
            created_at,
        }
    }

    /// Attach a human-readable reason.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attach diagnostic metadata.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Durable record of an order/SKU the engine could not reconcile, pending
/// human resolution. Resolved exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualReviewItem {
    pub review_id: i64,
    pub order_id: String,
    pub sku: String,
    pub reason: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub resolved: bool,
    pub resolved_by: Option<UserId>,
}

// =============================================================================
// Returns
// =============================================================================

/// Archival copy of a unit's state at the moment a sold serial was
/// rescanned as a return. Supports return-order detection and undo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnRecord {
    pub return_id: i64,
    pub original_unit_id: UnitId,
    pub product_id: ProductId,
    pub serial: Serial,
    pub serial_assigned_at: DateTime<Utc>,
    pub assigned_by: Option<UserId>,
    pub po_number: String,
    pub sn_prefix: Option<String>,
    pub sold: bool,
}

// =============================================================================
// Read models
// =============================================================================

/// Per-product slack within a sub-component pool: sellable units minus
/// quantity already soft-allocated. Used to rank soft-allocation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductAvailability {
    pub product_id: ProductId,
    pub available: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(serial: Serial, sold: bool, damaged: bool, disposed: bool) -> InventoryUnit {
        InventoryUnit {
            unit_id: 1,
            product_id: 1,
            serial,
            sold,
            is_damaged: damaged,
            disposed,
            po_number: "PO100".to_string(),
            sn_prefix: None,
            serial_assigned_at: Utc::now(),
            assigned_by: None,
        }
    }

    #[test]
    fn test_sellable_requires_real_serial() {
        assert!(!unit(Serial::sentinel(), false, false, false).is_sellable());
        assert!(unit(Serial::new("SN1").unwrap(), false, false, false).is_sellable());
    }

    #[test]
    fn test_sellable_excludes_sold_damaged_disposed() {
        let serial = Serial::new("SN1").unwrap();
        assert!(!unit(serial.clone(), true, false, false).is_sellable());
        assert!(!unit(serial.clone(), false, true, false).is_sellable());
        assert!(!unit(serial, false, false, true).is_sellable());
    }

    #[test]
    fn test_review_item_builder() {
        let item = NewReviewItem::new("11-100", "SKU-A", Utc::now())
            .with_reason("Soft allocation failed")
            .with_metadata(serde_json::json!({"unallocated": 2}));
        assert_eq!(item.order_id, "11-100");
        assert_eq!(item.reason.as_deref(), Some("Soft allocation failed"));
        assert!(item.metadata.is_some());
    }
}
