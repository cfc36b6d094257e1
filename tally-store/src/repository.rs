//! Storage trait definitions (Ports)
//!
//! These traits define the storage interface for the domain.
//! Implementations can be PostgreSQL or in-memory for testing.
//!
//! Unlike a plain repository, every operation runs on a `StoreTx`: an
//! explicit transaction handle obtained from `Store::begin`. Committing
//! publishes all staged mutations atomically; dropping the handle (or
//! calling `rollback`) discards them. The reconciliation engine leans on
//! this for its per-order all-or-nothing guarantee.

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tally_domain::{
    InventoryUnit, LogEntry, ManualReviewItem, NewReviewItem, PoolId, Product,
    ProductAvailability, ProductId, ReturnRecord, Serial, SoftAllocation, UnitId, UserId,
};

/// Handle to the durable store. Cheap to clone behind an Arc; all access
/// goes through transactions.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Open a transaction.
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;
}

/// One open transaction against the store.
///
/// Reads observe the transaction's own staged writes. An uncommitted
/// transaction rolls back on drop.
#[async_trait]
pub trait StoreTx: Send {
    // =========================================================================
    // Products
    // =========================================================================

    /// Insert a catalog row; the stored `product_id` is returned and the
    /// incoming one ignored. Fails with `Duplicate` on a reused part number.
    async fn insert_product(&mut self, product: &Product) -> Result<ProductId, StoreError>;

    /// Find a product by ID.
    async fn find_product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError>;

    // =========================================================================
    // Inventory units
    // =========================================================================

    /// Bulk-insert `quantity` untagged (sentinel-serial) units for a
    /// delivery. Returns the new unit ids.
    async fn insert_units(
        &mut self,
        product_id: ProductId,
        quantity: u32,
        po_number: &str,
        sn_prefix: Option<&str>,
        damaged: bool,
    ) -> Result<Vec<UnitId>, StoreError>;

    /// Find a unit by ID.
    async fn find_unit(&mut self, id: UnitId) -> Result<Option<InventoryUnit>, StoreError>;

    /// Find a unit by its real serial. Never matches sentinel rows: the
    /// sentinel is shared by every untagged unit and identifies nothing.
    async fn find_unit_by_serial(&mut self, serial: &Serial)
        -> Result<Option<InventoryUnit>, StoreError>;

    /// Assign a real serial to a unit, stamping `serial_assigned_at` and
    /// the assigning operator. Caller validates uniqueness and prefix.
    async fn assign_serial(
        &mut self,
        unit_id: UnitId,
        serial: &Serial,
        assigned_by: Option<UserId>,
    ) -> Result<(), StoreError>;

    /// Set the sold flag on the unit carrying `serial`. Returns the number
    /// of rows touched (0 when no such serial exists).
    async fn set_sold(&mut self, serial: &Serial, sold: bool) -> Result<u64, StoreError>;

    /// Set the damage flag on the unit carrying `serial`. Returns rows
    /// touched.
    async fn set_damaged(&mut self, serial: &Serial, damaged: bool) -> Result<u64, StoreError>;

    /// Clear damage and optionally re-associate the unit with a new
    /// product (repair may upgrade or swap the part).
    async fn repair_unit(
        &mut self,
        unit_id: UnitId,
        new_product_id: Option<ProductId>,
    ) -> Result<(), StoreError>;

    /// Mark a unit disposed (terminal).
    async fn dispose_unit(&mut self, unit_id: UnitId) -> Result<(), StoreError>;

    /// Delete a unit row (placeholder removal during return processing).
    async fn delete_unit(&mut self, unit_id: UnitId) -> Result<(), StoreError>;

    /// Reset a returned unit back into stock: unsold, fresh
    /// `serial_assigned_at`, PO set to the return marker.
    async fn reset_returned_unit(&mut self, unit_id: UnitId) -> Result<(), StoreError>;

    // =========================================================================
    // Pool queries
    // =========================================================================

    /// Sellable units of a pool, oldest-assigned first (FIFO: oldest stock
    /// depletes first), capped at `limit`.
    async fn oldest_unsold_in_pool(
        &mut self,
        pool: PoolId,
        limit: i64,
    ) -> Result<Vec<InventoryUnit>, StoreError>;

    /// Pick the product owning the oldest-assigned sellable unit in the
    /// pool, skipping products whose soft allocations already consume all
    /// of their sellable stock. Used by the bundled fallback, one unit at
    /// a time.
    async fn pick_fallback_product(&mut self, pool: PoolId)
        -> Result<Option<ProductId>, StoreError>;

    /// Per-product slack in a pool (sellable minus soft-allocated), ranked
    /// descending, zero-slack products omitted.
    async fn available_by_pool(&mut self, pool: PoolId)
        -> Result<Vec<ProductAvailability>, StoreError>;

    /// How many of an order's logged sales are units of the given pool
    /// (i.e. sub-components already hard-allocated to it).
    async fn count_pool_sales(&mut self, order_id: &str, pool: PoolId)
        -> Result<i64, StoreError>;

    // =========================================================================
    // Inventory log
    // =========================================================================

    /// Whether any log entry references this order (idempotency guard).
    async fn order_has_sales(&mut self, order_id: &str) -> Result<bool, StoreError>;

    /// Append a log entry, ignoring a conflicting (serial, order_id) pair.
    /// Returns false when the conflict was ignored.
    async fn insert_log_entry(&mut self, entry: &LogEntry) -> Result<bool, StoreError>;

    /// Whether any serial logged under this order traces back, through a
    /// return record, to a previously returned unit.
    async fn is_return_order(&mut self, order_id: &str) -> Result<bool, StoreError>;

    /// All log entries for an order, in insertion order.
    async fn log_entries_for_order(&mut self, order_id: &str)
        -> Result<Vec<LogEntry>, StoreError>;

    // =========================================================================
    // Soft allocations
    // =========================================================================

    /// Additive upsert keyed by (product_id, order_id).
    async fn add_soft_allocation(
        &mut self,
        product_id: ProductId,
        order_id: &str,
        quantity: i64,
        created_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Read a soft allocation row by key.
    async fn soft_allocation(
        &mut self,
        product_id: ProductId,
        order_id: &str,
    ) -> Result<Option<SoftAllocation>, StoreError>;

    // =========================================================================
    // Manual review
    // =========================================================================

    /// Insert a review row unless an unresolved one already exists for the
    /// same (order_id, sku). Returns whether a row was inserted.
    async fn insert_review_if_absent(&mut self, item: &NewReviewItem)
        -> Result<bool, StoreError>;

    /// Resolve the unresolved review row for (order_id, sku), attributing
    /// the operator. Returns rows touched (0 = absent or already resolved).
    async fn resolve_review(
        &mut self,
        order_id: &str,
        sku: &str,
        resolved_by: UserId,
    ) -> Result<u64, StoreError>;

    /// Unresolved review rows, newest first.
    async fn pending_reviews(&mut self) -> Result<Vec<ManualReviewItem>, StoreError>;

    // =========================================================================
    // Returns
    // =========================================================================

    /// Archive a unit's current state into the returns table; returns the
    /// new record id.
    async fn archive_return(&mut self, unit: &InventoryUnit) -> Result<i64, StoreError>;

    /// Return records archived for a unit, oldest first.
    async fn returns_for_unit(&mut self, unit_id: UnitId)
        -> Result<Vec<ReturnRecord>, StoreError>;

    // =========================================================================
    // Transaction control
    // =========================================================================

    /// Publish all staged mutations atomically.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Discard all staged mutations. Dropping the handle has the same
    /// effect; this is for making the intent explicit.
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
