//! PostgreSQL store implementation.
//!
//! Production implementation of the `Store` / `StoreTx` ports on top of a
//! sqlx connection pool. Every `StoreTx` wraps one database transaction;
//! dropping it without commit rolls back, matching the port contract.
//!
//! This module uses dynamic queries (sqlx::query) instead of compile-time
//! checked macros (sqlx::query!) to allow compilation without DATABASE_URL.

use crate::error::StoreError;
use crate::repository::{Store, StoreTx};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, info};
use tally_domain::{
    InventoryUnit, LogEntry, ManualReviewItem, NewReviewItem, PoolId, Product,
    ProductAvailability, ProductId, ReturnRecord, Serial, SoftAllocation, UnitId, UserId,
    RETURN_PO_MARKER, SENTINEL_SERIAL,
};

/// PostgreSQL-backed store.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the database.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        debug!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Run pending migrations from the workspace `migrations/` directory.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Migration failed: {}", e)))?;
        info!("Database migrations up to date");
        Ok(())
    }

    /// Get a reference to the underlying pool (for testing).
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }
}

/// One open database transaction.
struct PgTx {
    tx: Transaction<'static, Postgres>,
}

// =============================================================================
// Row parsing
// =============================================================================

fn parse_serial(raw: String) -> Result<Serial, StoreError> {
    Serial::new(&raw).map_err(|e| StoreError::Deserialization(format!("Invalid serial {raw:?}: {e}")))
}

fn parse_unit_row(row: &sqlx::postgres::PgRow) -> Result<InventoryUnit, StoreError> {
    Ok(InventoryUnit {
        unit_id: row.try_get("unit_id")?,
        product_id: row.try_get("product_id")?,
        serial: parse_serial(row.try_get("serial_number")?)?,
        sold: row.try_get("sold")?,
        is_damaged: row.try_get("is_damaged")?,
        disposed: row.try_get("disposed")?,
        po_number: row.try_get("po_number")?,
        sn_prefix: row.try_get("sn_prefix")?,
        serial_assigned_at: row.try_get("serial_assigned_at")?,
        assigned_by: row.try_get("assigned_by")?,
    })
}

fn parse_product_row(row: &sqlx::postgres::PgRow) -> Result<Product, StoreError> {
    Ok(Product {
        product_id: row.try_get("product_id")?,
        part_number: row.try_get("part_number")?,
        product_name: row.try_get("product_name")?,
        master_sku_id: row.try_get("master_sku_id")?,
        pool_id: row.try_get("pool_id")?,
    })
}

fn parse_log_row(row: &sqlx::postgres::PgRow) -> Result<LogEntry, StoreError> {
    Ok(LogEntry {
        sku: row.try_get("sku")?,
        serial: parse_serial(row.try_get("serial_number")?)?,
        order_id: row.try_get("order_id")?,
        event_time: row.try_get("event_time")?,
    })
}

fn parse_review_row(row: &sqlx::postgres::PgRow) -> Result<ManualReviewItem, StoreError> {
    Ok(ManualReviewItem {
        review_id: row.try_get("review_id")?,
        order_id: row.try_get("order_id")?,
        sku: row.try_get("sku")?,
        reason: row.try_get("reason")?,
        metadata: row.try_get("metadata")?,
        created_at: row.try_get("created_at")?,
        resolved: row.try_get("resolved")?,
        resolved_by: row.try_get("resolved_by")?,
    })
}

fn parse_return_row(row: &sqlx::postgres::PgRow) -> Result<ReturnRecord, StoreError> {
    Ok(ReturnRecord {
        return_id: row.try_get("return_id")?,
        original_unit_id: row.try_get("original_unit_id")?,
        product_id: row.try_get("product_id")?,
        serial: parse_serial(row.try_get("serial_number")?)?,
        serial_assigned_at: row.try_get("serial_assigned_at")?,
        assigned_by: row.try_get("assigned_by")?,
        po_number: row.try_get("po_number")?,
        sn_prefix: row.try_get("sn_prefix")?,
        sold: row.try_get("sold")?,
    })
}

// =============================================================================
// StoreTx implementation
// =============================================================================

#[async_trait]
impl StoreTx for PgTx {
    // =========================================================================
    // Products
    // =========================================================================

    async fn insert_product(&mut self, product: &Product) -> Result<ProductId, StoreError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO products (part_number, product_name, master_sku_id, pool_id)
            VALUES ($1, $2, $3, $4)
            RETURNING product_id
            "#,
        )
        .bind(&product.part_number)
        .bind(&product.product_name)
        .bind(&product.master_sku_id)
        .bind(product.pool_id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(id)
    }

    async fn find_product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query(
            "SELECT product_id, part_number, product_name, master_sku_id, pool_id
             FROM products WHERE product_id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(parse_product_row).transpose()
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
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM products WHERE product_id = $1)")
                .bind(product_id)
                .fetch_one(&mut *self.tx)
                .await?;
        if !exists {
            return Err(StoreError::not_found("product", product_id.to_string()));
        }

        let rows = sqlx::query(
            r#"
            INSERT INTO inventory_units (product_id, serial_number, po_number, sn_prefix, is_damaged)
            SELECT $1, $2, $3, $4, $5
            FROM generate_series(1, $6)
            RETURNING unit_id
            "#,
        )
        .bind(product_id)
        .bind(SENTINEL_SERIAL)
        .bind(po_number)
        .bind(sn_prefix)
        .bind(damaged)
        .bind(quantity as i64)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter()
            .map(|row| row.try_get::<i64, _>("unit_id").map_err(StoreError::from))
            .collect()
    }

    async fn find_unit(&mut self, id: UnitId) -> Result<Option<InventoryUnit>, StoreError> {
        let row = sqlx::query(
            "SELECT unit_id, product_id, serial_number, sold, is_damaged, disposed,
                    po_number, sn_prefix, serial_assigned_at, assigned_by
             FROM inventory_units WHERE unit_id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(parse_unit_row).transpose()
    }

    async fn find_unit_by_serial(
        &mut self,
        serial: &Serial,
    ) -> Result<Option<InventoryUnit>, StoreError> {
        if serial.is_sentinel() {
            return Ok(None);
        }

        let row = sqlx::query(
            "SELECT unit_id, product_id, serial_number, sold, is_damaged, disposed,
                    po_number, sn_prefix, serial_assigned_at, assigned_by
             FROM inventory_units WHERE serial_number = $1",
        )
        .bind(serial.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(parse_unit_row).transpose()
    }

    async fn assign_serial(
        &mut self,
        unit_id: UnitId,
        serial: &Serial,
        assigned_by: Option<UserId>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE inventory_units
            SET serial_number      = $1,
                serial_assigned_at = NOW(),
                assigned_by        = $2
            WHERE unit_id = $3
            "#,
        )
        .bind(serial.as_str())
        .bind(assigned_by)
        .bind(unit_id)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("unit", unit_id.to_string()));
        }
        Ok(())
    }

    async fn set_sold(&mut self, serial: &Serial, sold: bool) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE inventory_units SET sold = $1
             WHERE serial_number = $2 AND serial_number <> $3",
        )
        .bind(sold)
        .bind(serial.as_str())
        .bind(SENTINEL_SERIAL)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected())
    }

    async fn set_damaged(&mut self, serial: &Serial, damaged: bool) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE inventory_units SET is_damaged = $1
             WHERE serial_number = $2 AND serial_number <> $3",
        )
        .bind(damaged)
        .bind(serial.as_str())
        .bind(SENTINEL_SERIAL)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected())
    }

    async fn repair_unit(
        &mut self,
        unit_id: UnitId,
        new_product_id: Option<ProductId>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE inventory_units
             SET is_damaged = FALSE, product_id = COALESCE($1, product_id)
             WHERE unit_id = $2",
        )
        .bind(new_product_id)
        .bind(unit_id)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("unit", unit_id.to_string()));
        }
        Ok(())
    }

    async fn dispose_unit(&mut self, unit_id: UnitId) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE inventory_units SET disposed = TRUE WHERE unit_id = $1")
            .bind(unit_id)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("unit", unit_id.to_string()));
        }
        Ok(())
    }

    async fn delete_unit(&mut self, unit_id: UnitId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM inventory_units WHERE unit_id = $1")
            .bind(unit_id)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("unit", unit_id.to_string()));
        }
        Ok(())
    }

    async fn reset_returned_unit(&mut self, unit_id: UnitId) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE inventory_units
            SET sold               = FALSE,
                serial_assigned_at = NOW(),
                po_number          = $1
            WHERE unit_id = $2
            "#,
        )
        .bind(RETURN_PO_MARKER)
        .bind(unit_id)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("unit", unit_id.to_string()));
        }
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
        let rows = sqlx::query(
            r#"
            SELECT iu.unit_id, iu.product_id, iu.serial_number, iu.sold, iu.is_damaged,
                   iu.disposed, iu.po_number, iu.sn_prefix, iu.serial_assigned_at, iu.assigned_by
            FROM inventory_units iu
            JOIN products p ON iu.product_id = p.product_id
            WHERE iu.sold = FALSE
              AND iu.is_damaged = FALSE
              AND iu.disposed = FALSE
              AND iu.serial_number <> $1
              AND p.pool_id = $2
            ORDER BY iu.serial_assigned_at ASC, iu.unit_id ASC
            LIMIT $3
            "#,
        )
        .bind(SENTINEL_SERIAL)
        .bind(pool)
        .bind(limit)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter().map(parse_unit_row).collect()
    }

    async fn pick_fallback_product(
        &mut self,
        pool: PoolId,
    ) -> Result<Option<ProductId>, StoreError> {
        let product_id: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT iu.product_id
            FROM inventory_units iu
            JOIN products p ON iu.product_id = p.product_id
            WHERE iu.sold = FALSE
              AND iu.is_damaged = FALSE
              AND iu.disposed = FALSE
              AND iu.serial_number <> $1
              AND p.pool_id = $2
              AND iu.product_id NOT IN (
                  SELECT sa.product_id
                  FROM soft_allocations sa
                  GROUP BY sa.product_id
                  HAVING SUM(sa.quantity) >= (
                      SELECT COUNT(*) FROM inventory_units
                      WHERE sold = FALSE AND is_damaged = FALSE AND disposed = FALSE
                        AND serial_number <> $1
                        AND product_id = sa.product_id
                  )
              )
            ORDER BY iu.serial_assigned_at ASC, iu.unit_id ASC
            LIMIT 1
            "#,
        )
        .bind(SENTINEL_SERIAL)
        .bind(pool)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(product_id)
    }

    async fn available_by_pool(
        &mut self,
        pool: PoolId,
    ) -> Result<Vec<ProductAvailability>, StoreError> {
        let rows = sqlx::query(
            r#"
            WITH sellable AS (
                SELECT p.product_id, COUNT(*) AS sellable_qty
                FROM inventory_units iu
                JOIN products p ON iu.product_id = p.product_id
                WHERE iu.sold = FALSE AND iu.is_damaged = FALSE AND iu.disposed = FALSE
                  AND iu.serial_number <> $1 AND p.pool_id = $2
                GROUP BY p.product_id
            ),
            soft AS (
                SELECT product_id, SUM(quantity) AS soft_qty
                FROM soft_allocations
                GROUP BY product_id
            )
            SELECT s.product_id,
                   (COALESCE(s.sellable_qty, 0) - COALESCE(so.soft_qty, 0))::BIGINT AS available
            FROM sellable s
            LEFT JOIN soft so ON s.product_id = so.product_id
            WHERE (COALESCE(s.sellable_qty, 0) - COALESCE(so.soft_qty, 0)) > 0
            ORDER BY available DESC, s.product_id ASC
            "#,
        )
        .bind(SENTINEL_SERIAL)
        .bind(pool)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(ProductAvailability {
                    product_id: row.try_get("product_id")?,
                    available: row.try_get("available")?,
                })
            })
            .collect()
    }

    async fn count_pool_sales(&mut self, order_id: &str, pool: PoolId) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM inventory_log il
            JOIN inventory_units iu ON il.serial_number = iu.serial_number
            JOIN products p ON iu.product_id = p.product_id
            WHERE il.order_id = $1 AND p.pool_id = $2
            "#,
        )
        .bind(order_id)
        .bind(pool)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(count)
    }

    // =========================================================================
    // Inventory log
    // =========================================================================

    async fn order_has_sales(&mut self, order_id: &str) -> Result<bool, StoreError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM inventory_log WHERE order_id = $1)")
                .bind(order_id)
                .fetch_one(&mut *self.tx)
                .await?;
        Ok(exists)
    }

    async fn insert_log_entry(&mut self, entry: &LogEntry) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO inventory_log (sku, serial_number, order_id, event_time)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (serial_number, order_id) DO NOTHING
            "#,
        )
        .bind(&entry.sku)
        .bind(entry.serial.as_str())
        .bind(&entry.order_id)
        .bind(entry.event_time)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn is_return_order(&mut self, order_id: &str) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM returns r
                JOIN inventory_units iu ON r.original_unit_id = iu.unit_id
                JOIN inventory_log il ON il.serial_number = iu.serial_number
                WHERE il.order_id = $1
            )
            "#,
        )
        .bind(order_id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(exists)
    }

    async fn log_entries_for_order(
        &mut self,
        order_id: &str,
    ) -> Result<Vec<LogEntry>, StoreError> {
        let rows = sqlx::query(
            "SELECT sku, serial_number, order_id, event_time
             FROM inventory_log WHERE order_id = $1
             ORDER BY event_time ASC, serial_number ASC",
        )
        .bind(order_id)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter().map(parse_log_row).collect()
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
        sqlx::query(
            r#"
            INSERT INTO soft_allocations (product_id, order_id, quantity, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (product_id, order_id) DO UPDATE
            SET quantity = soft_allocations.quantity + EXCLUDED.quantity
            "#,
        )
        .bind(product_id)
        .bind(order_id)
        .bind(quantity)
        .bind(created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn soft_allocation(
        &mut self,
        product_id: ProductId,
        order_id: &str,
    ) -> Result<Option<SoftAllocation>, StoreError> {
        let row = sqlx::query(
            "SELECT product_id, order_id, quantity, created_at
             FROM soft_allocations WHERE product_id = $1 AND order_id = $2",
        )
        .bind(product_id)
        .bind(order_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(|row| {
            Ok(SoftAllocation {
                product_id: row.try_get("product_id")?,
                order_id: row.try_get("order_id")?,
                quantity: row.try_get("quantity")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .transpose()
    }

    // =========================================================================
    // Manual review
    // =========================================================================

    async fn insert_review_if_absent(&mut self, item: &NewReviewItem) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO manual_review (order_id, sku, reason, metadata, created_at)
            SELECT $1, $2, $3, $4, $5
            WHERE NOT EXISTS (
                SELECT 1 FROM manual_review
                WHERE order_id = $1 AND sku = $2 AND NOT resolved
            )
            "#,
        )
        .bind(&item.order_id)
        .bind(&item.sku)
        .bind(&item.reason)
        .bind(&item.metadata)
        .bind(item.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn resolve_review(
        &mut self,
        order_id: &str,
        sku: &str,
        resolved_by: UserId,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE manual_review
            SET resolved = TRUE,
                resolved_by = $1
            WHERE order_id = $2 AND sku = $3 AND resolved = FALSE
            "#,
        )
        .bind(resolved_by)
        .bind(order_id)
        .bind(sku)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected())
    }

    async fn pending_reviews(&mut self) -> Result<Vec<ManualReviewItem>, StoreError> {
        let rows = sqlx::query(
            "SELECT review_id, order_id, sku, reason, metadata, created_at, resolved, resolved_by
             FROM manual_review
             WHERE resolved = FALSE
             ORDER BY created_at DESC, review_id DESC",
        )
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter().map(parse_review_row).collect()
    }

    // =========================================================================
    // Returns
    // =========================================================================

    async fn archive_return(&mut self, unit: &InventoryUnit) -> Result<i64, StoreError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO returns (
                original_unit_id, product_id, serial_number, serial_assigned_at,
                assigned_by, po_number, sn_prefix, sold
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING return_id
            "#,
        )
        .bind(unit.unit_id)
        .bind(unit.product_id)
        .bind(unit.serial.as_str())
        .bind(unit.serial_assigned_at)
        .bind(unit.assigned_by)
        .bind(&unit.po_number)
        .bind(&unit.sn_prefix)
        .bind(unit.sold)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(id)
    }

    async fn returns_for_unit(&mut self, unit_id: UnitId) -> Result<Vec<ReturnRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT return_id, original_unit_id, product_id, serial_number, serial_assigned_at,
                    assigned_by, po_number, sn_prefix, sold
             FROM returns WHERE original_unit_id = $1
             ORDER BY return_id ASC",
        )
        .bind(unit_id)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter().map(parse_return_row).collect()
    }

    // =========================================================================
    // Transaction control
    // =========================================================================

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
