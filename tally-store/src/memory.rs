//! In-memory store implementation
//!
//! Used for testing and development without a database.
//!
//! Transactions stage a full copy of the state: reads observe staged
//! writes, commit publishes the staged copy, and dropping the transaction
//! discards it. Concurrent transactions are last-write-wins, which is fine
//! for the single-writer tests this store exists for.

use crate::error::StoreError;
use crate::repository::{Store, StoreTx};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tally_domain::{
    InventoryUnit, LogEntry, ManualReviewItem, NewReviewItem, PoolId, Product,
    ProductAvailability, ProductId, ReturnRecord, Serial, SoftAllocation, UnitId, UserId,
    RETURN_PO_MARKER,
};

/// In-memory store for testing
#[derive(Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default, Clone)]
struct Inner {
    products: HashMap<ProductId, Product>,
    units: HashMap<UnitId, InventoryUnit>,
    log: Vec<LogEntry>,
    soft: HashMap<(ProductId, String), SoftAllocation>,
    reviews: Vec<ManualReviewItem>,
    returns: Vec<ReturnRecord>,
    next_product_id: i64,
    next_unit_id: i64,
    next_review_id: i64,
    next_return_id: i64,
}

impl MemoryStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored units (test inspection)
    pub fn unit_count(&self) -> usize {
        self.inner.lock().unwrap().units.len()
    }

    /// Number of log entries (test inspection)
    pub fn log_count(&self) -> usize {
        self.inner.lock().unwrap().log.len()
    }

    /// Clear all data (useful for test setup)
    pub fn clear(&self) {
        *self.inner.lock().unwrap() = Inner::default();
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let staged = self.inner.lock().unwrap().clone();
        Ok(Box::new(MemoryTx { shared: Arc::clone(&self.inner), staged }))
    }
}

/// One staged transaction against a [`MemoryStore`].
struct MemoryTx {
    shared: Arc<Mutex<Inner>>,
    staged: Inner,
}

impl Inner {
    fn unit_by_serial(&self, serial: &Serial) -> Option<&InventoryUnit> {
        if serial.is_sentinel() {
            return None;
        }
        self.units.values().find(|u| u.serial == *serial)
    }

    /// Sellable (tagged, unsold, undamaged, undisposed) units of a product.
    fn sellable_count(&self, product_id: ProductId) -> i64 {
        self.units
            .values()
            .filter(|u| u.product_id == product_id && u.is_sellable())
            .count() as i64
    }

    fn soft_total(&self, product_id: ProductId) -> i64 {
        self.soft
            .values()
            .filter(|a| a.product_id == product_id)
            .map(|a| a.quantity)
            .sum()
    }

    fn pool_of(&self, product_id: ProductId) -> Option<PoolId> {
        self.products.get(&product_id).and_then(|p| p.pool_id)
    }

    /// Sellable units of a pool, oldest-assigned first.
    fn sellable_in_pool(&self, pool: PoolId) -> Vec<&InventoryUnit> {
        let mut units: Vec<&InventoryUnit> = self
            .units
            .values()
            .filter(|u| u.is_sellable() && self.pool_of(u.product_id) == Some(pool))
            .collect();
        units.sort_by_key(|u| (u.serial_assigned_at, u.unit_id));
        units
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    // =========================================================================
    // Products
    // =========================================================================

    async fn insert_product(&mut self, product: &Product) -> Result<ProductId, StoreError> {
        if self.staged.products.values().any(|p| p.part_number == product.part_number) {
            return Err(StoreError::duplicate("product", &product.part_number));
        }
        self.staged.next_product_id += 1;
        let id = self.staged.next_product_id;
        let mut stored = product.clone();
        stored.product_id = id;
        self.staged.products.insert(id, stored);
        Ok(id)
    }

    async fn find_product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.staged.products.get(&id).cloned())
    }

    // =========================================================================
    // Inventory units
    // =========================================================================

    async fn insert_units(
        &mut self,
        product_id: ProductId,
        quantity: u32,
        po_number: &str,
        sn_prefix: Option<&str>,
        damaged: bool,
    ) -> Result<Vec<UnitId>, StoreError> {
        if !self.staged.products.contains_key(&product_id) {
            return Err(StoreError::not_found("product", product_id.to_string()));
        }
        let now = Utc::now();
        let mut ids = Vec::with_capacity(quantity as usize);
        for _ in 0..quantity {
            self.staged.next_unit_id += 1;
            let id = self.staged.next_unit_id;
            self.staged.units.insert(
                id,
                InventoryUnit {
                    unit_id: id,
                    product_id,
                    serial: Serial::sentinel(),
                    sold: false,
                    is_damaged: damaged,
                    disposed: false,
                    po_number: po_number.to_string(),
                    sn_prefix: sn_prefix.map(str::to_string),
                    serial_assigned_at: now,
                    assigned_by: None,
                },
            );
            ids.push(id);
        }
        Ok(ids)
    }

    async fn find_unit(&mut self, id: UnitId) -> Result<Option<InventoryUnit>, StoreError> {
        Ok(self.staged.units.get(&id).cloned())
    }

    async fn find_unit_by_serial(
        &mut self,
        serial: &Serial,
    ) -> Result<Option<InventoryUnit>, StoreError> {
        Ok(self.staged.unit_by_serial(serial).cloned())
    }

    async fn assign_serial(
        &mut self,
        unit_id: UnitId,
        serial: &Serial,
        assigned_by: Option<UserId>,
    ) -> Result<(), StoreError> {
        // Same uniqueness guarantee as the partial index in Postgres.
        if self.staged.unit_by_serial(serial).is_some() {
            return Err(StoreError::duplicate("unit", serial.as_str()));
        }
        let unit = self
            .staged
            .units
            .get_mut(&unit_id)
            .ok_or_else(|| StoreError::not_found("unit", unit_id.to_string()))?;
        unit.serial = serial.clone();
        unit.serial_assigned_at = Utc::now();
        unit.assigned_by = assigned_by;
        Ok(())
    }

    async fn set_sold(&mut self, serial: &Serial, sold: bool) -> Result<u64, StoreError> {
        let unit_id = match self.staged.unit_by_serial(serial) {
            Some(unit) => unit.unit_id,
            None => return Ok(0),
        };
        if let Some(unit) = self.staged.units.get_mut(&unit_id) {
            unit.sold = sold;
        }
        Ok(1)
    }

    async fn set_damaged(&mut self, serial: &Serial, damaged: bool) -> Result<u64, StoreError> {
        let unit_id = match self.staged.unit_by_serial(serial) {
            Some(unit) => unit.unit_id,
            None => return Ok(0),
        };
        if let Some(unit) = self.staged.units.get_mut(&unit_id) {
            unit.is_damaged = damaged;
        }
        Ok(1)
    }

    async fn repair_unit(
        &mut self,
        unit_id: UnitId,
        new_product_id: Option<ProductId>,
    ) -> Result<(), StoreError> {
        if let Some(product_id) = new_product_id {
            if !self.staged.products.contains_key(&product_id) {
                return Err(StoreError::not_found("product", product_id.to_string()));
            }
        }
        let unit = self
            .staged
            .units
            .get_mut(&unit_id)
            .ok_or_else(|| StoreError::not_found("unit", unit_id.to_string()))?;
        unit.is_damaged = false;
        if let Some(product_id) = new_product_id {
            unit.product_id = product_id;
        }
        Ok(())
    }

    async fn dispose_unit(&mut self, unit_id: UnitId) -> Result<(), StoreError> {
        let unit = self
            .staged
            .units
            .get_mut(&unit_id)
            .ok_or_else(|| StoreError::not_found("unit", unit_id.to_string()))?;
        unit.disposed = true;
        Ok(())
    }

    async fn delete_unit(&mut self, unit_id: UnitId) -> Result<(), StoreError> {
        self.staged
            .units
            .remove(&unit_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("unit", unit_id.to_string()))
    }

    async fn reset_returned_unit(&mut self, unit_id: UnitId) -> Result<(), StoreError> {
        let unit = self
            .staged
            .units
            .get_mut(&unit_id)
            .ok_or_else(|| StoreError::not_found("unit", unit_id.to_string()))?;
        unit.sold = false;
        unit.po_number = RETURN_PO_MARKER.to_string();
        unit.serial_assigned_at = Utc::now();
        Ok(())
    }

    // =========================================================================
    // Pool queries
    // =========================================================================

    async fn oldest_unsold_in_pool(
        &mut self,
        pool: PoolId,
        limit: i64,
    ) -> Result<Vec<InventoryUnit>, StoreError> {
        Ok(self
            .staged
            .sellable_in_pool(pool)
            .into_iter()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn pick_fallback_product(
        &mut self,
        pool: PoolId,
    ) -> Result<Option<ProductId>, StoreError> {
        let candidate = self
            .staged
            .sellable_in_pool(pool)
            .into_iter()
            .find(|u| self.staged.soft_total(u.product_id) < self.staged.sellable_count(u.product_id))
            .map(|u| u.product_id);
        Ok(candidate)
    }

    async fn available_by_pool(
        &mut self,
        pool: PoolId,
    ) -> Result<Vec<ProductAvailability>, StoreError> {
        let mut rows: Vec<ProductAvailability> = self
            .staged
            .products
            .values()
            .filter(|p| p.pool_id == Some(pool))
            .map(|p| ProductAvailability {
                product_id: p.product_id,
                available: self.staged.sellable_count(p.product_id)
                    - self.staged.soft_total(p.product_id),
            })
            .filter(|a| a.available > 0)
            .collect();
        rows.sort_by_key(|a| (std::cmp::Reverse(a.available), a.product_id));
        Ok(rows)
    }

    async fn count_pool_sales(
        &mut self,
        order_id: &str,
        pool: PoolId,
    ) -> Result<i64, StoreError> {
        let count = self
            .staged
            .log
            .iter()
            .filter(|e| e.order_id == order_id)
            .filter_map(|e| self.staged.unit_by_serial(&e.serial))
            .filter(|u| self.staged.pool_of(u.product_id) == Some(pool))
            .count();
        Ok(count as i64)
    }

    // =========================================================================
    // Inventory log
    // =========================================================================

    async fn order_has_sales(&mut self, order_id: &str) -> Result<bool, StoreError> {
        Ok(self.staged.log.iter().any(|e| e.order_id == order_id))
    }

    async fn insert_log_entry(&mut self, entry: &LogEntry) -> Result<bool, StoreError> {
        let exists = self
            .staged
            .log
            .iter()
            .any(|e| e.serial == entry.serial && e.order_id == entry.order_id);
        if exists {
            return Ok(false);
        }
        self.staged.log.push(entry.clone());
        Ok(true)
    }

    async fn is_return_order(&mut self, order_id: &str) -> Result<bool, StoreError> {
        let hit = self
            .staged
            .log
            .iter()
            .filter(|e| e.order_id == order_id)
            .filter_map(|e| self.staged.unit_by_serial(&e.serial))
            .any(|u| self.staged.returns.iter().any(|r| r.original_unit_id == u.unit_id));
        Ok(hit)
    }

    async fn log_entries_for_order(
        &mut self,
        order_id: &str,
    ) -> Result<Vec<LogEntry>, StoreError> {
        Ok(self
            .staged
            .log
            .iter()
            .filter(|e| e.order_id == order_id)
            .cloned()
            .collect())
    }

    // =========================================================================
    // Soft allocations
    // =========================================================================

    async fn add_soft_allocation(
        &mut self,
        product_id: ProductId,
        order_id: &str,
        quantity: i64,
        created_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let key = (product_id, order_id.to_string());
        match self.staged.soft.get_mut(&key) {
            Some(existing) => existing.quantity += quantity,
            None => {
                self.staged.soft.insert(
                    key,
                    SoftAllocation {
                        product_id,
                        order_id: order_id.to_string(),
                        quantity,
                        created_at,
                    },
                );
            },
        }
        Ok(())
    }

    async fn soft_allocation(
        &mut self,
        product_id: ProductId,
        order_id: &str,
    ) -> Result<Option<SoftAllocation>, StoreError> {
        Ok(self.staged.soft.get(&(product_id, order_id.to_string())).cloned())
    }

    // =========================================================================
    // Manual review
    // =========================================================================

    async fn insert_review_if_absent(&mut self, item: &NewReviewItem) -> Result<bool, StoreError> {
        let open = self
            .staged
            .reviews
            .iter()
            .any(|r| !r.resolved && r.order_id == item.order_id && r.sku == item.sku);
        if open {
            return Ok(false);
        }
        self.staged.next_review_id += 1;
        self.staged.reviews.push(ManualReviewItem {
            review_id: self.staged.next_review_id,
            order_id: item.order_id.clone(),
            sku: item.sku.clone(),
            reason: item.reason.clone(),
            metadata: item.metadata.clone(),
            created_at: item.created_at,
            resolved: false,
            resolved_by: None,
        });
        Ok(true)
    }

    async fn resolve_review(
        &mut self,
        order_id: &str,
        sku: &str,
        resolved_by: UserId,
    ) -> Result<u64, StoreError> {
        match self
            .staged
            .reviews
            .iter_mut()
            .find(|r| !r.resolved && r.order_id == order_id && r.sku == sku)
        {
            Some(row) => {
                row.resolved = true;
                row.resolved_by = Some(resolved_by);
                Ok(1)
            },
            None => Ok(0),
        }
    }

    async fn pending_reviews(&mut self) -> Result<Vec<ManualReviewItem>, StoreError> {
        let mut rows: Vec<ManualReviewItem> =
            self.staged.reviews.iter().filter(|r| !r.resolved).cloned().collect();
        rows.sort_by_key(|r| (std::cmp::Reverse(r.created_at), std::cmp::Reverse(r.review_id)));
        Ok(rows)
    }

    // =========================================================================
    // Returns
    // =========================================================================

    async fn archive_return(&mut self, unit: &InventoryUnit) -> Result<i64, StoreError> {
        self.staged.next_return_id += 1;
        let id = self.staged.next_return_id;
        self.staged.returns.push(ReturnRecord {
            return_id: id,
            original_unit_id: unit.unit_id,
            product_id: unit.product_id,
            serial: unit.serial.clone(),
            serial_assigned_at: unit.serial_assigned_at,
            assigned_by: unit.assigned_by,
            po_number: unit.po_number.clone(),
            sn_prefix: unit.sn_prefix.clone(),
            sold: unit.sold,
        });
        Ok(id)
    }

    async fn returns_for_unit(&mut self, unit_id: UnitId) -> Result<Vec<ReturnRecord>, StoreError> {
        Ok(self
            .staged
            .returns
            .iter()
            .filter(|r| r.original_unit_id == unit_id)
            .cloned()
            .collect())
    }

    // =========================================================================
    // Transaction control
    // =========================================================================

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        *self.shared.lock().unwrap() = self.staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn product(part_number: &str, pool: Option<PoolId>) -> Product {
        Product {
            product_id: 0,
            part_number: part_number.to_string(),
            product_name: format!("{} name", part_number),
            master_sku_id: "MSKU-1".to_string(),
            pool_id: pool,
        }
    }

    async fn seed_tagged_unit(
        tx: &mut Box<dyn StoreTx>,
        product_id: ProductId,
        serial: &str,
    ) -> UnitId {
        let ids = tx.insert_units(product_id, 1, "PO100", None, false).await.unwrap();
        tx.assign_serial(ids[0], &Serial::new(serial).unwrap(), None).await.unwrap();
        ids[0]
    }

    #[tokio::test]
    async fn test_commit_publishes_rollback_discards() {
        let store = MemoryStore::new();

        let mut tx = store.begin().await.unwrap();
        let pid = tx.insert_product(&product("SKU-A", None)).await.unwrap();
        tx.insert_units(pid, 2, "PO100", None, false).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.unit_count(), 2);

        let mut tx = store.begin().await.unwrap();
        tx.insert_units(pid, 3, "PO101", None, false).await.unwrap();
        tx.rollback().await.unwrap();
        assert_eq!(store.unit_count(), 2);
    }

    #[tokio::test]
    async fn test_dropped_tx_rolls_back() {
        let store = MemoryStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            let pid = tx.insert_product(&product("SKU-A", None)).await.unwrap();
            tx.insert_units(pid, 1, "PO100", None, false).await.unwrap();
            // No commit.
        }
        assert_eq!(store.unit_count(), 0);
    }

    #[tokio::test]
    async fn test_find_by_serial_never_matches_sentinel() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let pid = tx.insert_product(&product("SKU-A", None)).await.unwrap();
        tx.insert_units(pid, 2, "PO100", None, false).await.unwrap();

        let found = tx.find_unit_by_serial(&Serial::sentinel()).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_assign_serial_rejects_duplicate() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let pid = tx.insert_product(&product("SKU-A", None)).await.unwrap();
        let ids = tx.insert_units(pid, 2, "PO100", None, false).await.unwrap();

        let serial = Serial::new("SN1").unwrap();
        tx.assign_serial(ids[0], &serial, Some(7)).await.unwrap();
        let err = tx.assign_serial(ids[1], &serial, Some(7)).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));
    }

    #[tokio::test]
    async fn test_soft_allocation_is_additive() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let pid = tx.insert_product(&product("SKU-A", Some(2))).await.unwrap();

        let now = Utc::now();
        tx.add_soft_allocation(pid, "11-100", 2, now).await.unwrap();
        tx.add_soft_allocation(pid, "11-100", 3, now).await.unwrap();

        let row = tx.soft_allocation(pid, "11-100").await.unwrap().unwrap();
        assert_eq!(row.quantity, 5);
    }

    #[tokio::test]
    async fn test_review_insert_if_absent() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();

        let item = NewReviewItem::new("11-100", "SKU-A", Utc::now());
        assert!(tx.insert_review_if_absent(&item).await.unwrap());
        assert!(!tx.insert_review_if_absent(&item).await.unwrap());
        assert_eq!(tx.pending_reviews().await.unwrap().len(), 1);

        // Resolving reopens the key for future cycles.
        assert_eq!(tx.resolve_review("11-100", "SKU-A", 42).await.unwrap(), 1);
        assert_eq!(tx.resolve_review("11-100", "SKU-A", 42).await.unwrap(), 0);
        assert!(tx.insert_review_if_absent(&item).await.unwrap());
    }

    #[tokio::test]
    async fn test_log_entry_conflict_is_ignored() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();

        let entry = LogEntry {
            sku: "SKU-A".to_string(),
            serial: Serial::new("SN1").unwrap(),
            order_id: "11-100".to_string(),
            event_time: Utc::now(),
        };
        assert!(tx.insert_log_entry(&entry).await.unwrap());
        assert!(!tx.insert_log_entry(&entry).await.unwrap());
        assert_eq!(tx.log_entries_for_order("11-100").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_oldest_unsold_in_pool_is_fifo() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let pid = tx.insert_product(&product("MOD-1", Some(2))).await.unwrap();

        // Assigned in this order, so FIFO follows assignment time.
        let first = seed_tagged_unit(&mut tx, pid, "M1").await;
        let second = seed_tagged_unit(&mut tx, pid, "M2").await;
        let _third = seed_tagged_unit(&mut tx, pid, "M3").await;

        let units = tx.oldest_unsold_in_pool(2, 2).await.unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].unit_id, first);
        assert_eq!(units[1].unit_id, second);
    }

    #[tokio::test]
    async fn test_pool_queries_skip_unsellable_units() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let pid = tx.insert_product(&product("MOD-1", Some(2))).await.unwrap();

        // One sentinel, one damaged, one sold, one sellable.
        tx.insert_units(pid, 1, "PO100", None, false).await.unwrap();
        seed_tagged_unit(&mut tx, pid, "M1").await;
        tx.set_damaged(&Serial::new("M1").unwrap(), true).await.unwrap();
        seed_tagged_unit(&mut tx, pid, "M2").await;
        tx.set_sold(&Serial::new("M2").unwrap(), true).await.unwrap();
        seed_tagged_unit(&mut tx, pid, "M3").await;

        let units = tx.oldest_unsold_in_pool(2, 10).await.unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].serial.as_str(), "M3");

        let avail = tx.available_by_pool(2).await.unwrap();
        assert_eq!(avail, vec![ProductAvailability { product_id: pid, available: 1 }]);
    }

    #[tokio::test]
    async fn test_pick_fallback_product_respects_soft_saturation() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let saturated = tx.insert_product(&product("MOD-A", Some(1))).await.unwrap();
        let open = tx.insert_product(&product("MOD-B", Some(1))).await.unwrap();

        seed_tagged_unit(&mut tx, saturated, "A1").await;
        seed_tagged_unit(&mut tx, open, "B1").await;

        // Saturate MOD-A: one sellable unit, one soft-allocated claim.
        tx.add_soft_allocation(saturated, "11-900", 1, Utc::now()).await.unwrap();

        let picked = tx.pick_fallback_product(1).await.unwrap();
        assert_eq!(picked, Some(open));
    }

    #[tokio::test]
    async fn test_available_by_pool_ranks_descending() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let small = tx.insert_product(&product("MOD-A", Some(2))).await.unwrap();
        let large = tx.insert_product(&product("MOD-B", Some(2))).await.unwrap();

        seed_tagged_unit(&mut tx, small, "A1").await;
        seed_tagged_unit(&mut tx, large, "B1").await;
        seed_tagged_unit(&mut tx, large, "B2").await;

        let avail = tx.available_by_pool(2).await.unwrap();
        assert_eq!(avail[0].product_id, large);
        assert_eq!(avail[0].available, 2);
        assert_eq!(avail[1].product_id, small);
    }

    #[tokio::test]
    async fn test_is_return_order_traces_through_returns() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let pid = tx.insert_product(&product("SKU-A", None)).await.unwrap();
        let unit_id = seed_tagged_unit(&mut tx, pid, "SN1").await;

        let entry = LogEntry {
            sku: "SKU-A".to_string(),
            serial: Serial::new("SN1").unwrap(),
            order_id: "11-200".to_string(),
            event_time: Utc::now(),
        };
        tx.insert_log_entry(&entry).await.unwrap();
        assert!(!tx.is_return_order("11-200").await.unwrap());

        let unit = tx.find_unit(unit_id).await.unwrap().unwrap();
        tx.archive_return(&unit).await.unwrap();
        assert!(tx.is_return_order("11-200").await.unwrap());
        assert!(!tx.is_return_order("11-999").await.unwrap());
    }
}
