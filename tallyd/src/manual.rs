//! Operator-triggered unit and review operations.
//!
//! Thin transactional services behind the HTTP surface: delivery intake,
//! serial assignment, damage/repair/disposal, manual sold-flag fixes, and
//! review resolution. Each runs in its own transaction and surfaces a
//! specific rejection reason; none of them touch reconciliation state
//! beyond the rows they name.

use tracing::info;

use tally_domain::{
    validate_po_number, validate_sn_prefix, DomainError, ManualReviewItem, ProductId, Serial,
    UnitId, UserId,
};
use tally_store::{Store, StoreTx};

use crate::error::{DaemonError, DaemonResult};

/// Bulk-create untagged units for a received delivery.
pub async fn add_delivery<S: Store>(
    store: &S,
    product_id: ProductId,
    quantity: u32,
    po_number: &str,
    sn_prefix: Option<&str>,
    damaged: bool,
) -> DaemonResult<Vec<UnitId>> {
    if quantity == 0 {
        return Err(DomainError::InvalidQuantity("quantity must be greater than zero".to_string()).into());
    }
    validate_po_number(po_number)?;
    if let Some(prefix) = sn_prefix {
        validate_sn_prefix(prefix)?;
    }

    let mut tx = store.begin().await?;
    let ids = tx.insert_units(product_id, quantity, po_number, sn_prefix, damaged).await?;
    tx.commit().await?;

    info!(product_id, quantity, po_number, "Delivery intake recorded");
    Ok(ids)
}

/// Assign a real serial to an untagged unit.
///
/// Rejected when the serial exists anywhere, the unit is missing or
/// already tagged, or the unit's SN prefix constraint doesn't match.
pub async fn assign_serial<S: Store>(
    store: &S,
    unit_id: UnitId,
    new_serial: &Serial,
    user: UserId,
) -> DaemonResult<()> {
    if new_serial.is_sentinel() {
        return Err(DomainError::InvalidSerial("cannot assign the placeholder serial".to_string()).into());
    }

    let mut tx = store.begin().await?;

    if tx.find_unit_by_serial(new_serial).await?.is_some() {
        return Err(DaemonError::SerialAlreadyExists(new_serial.to_string()));
    }

    let unit = tx
        .find_unit(unit_id)
        .await?
        .ok_or(DaemonError::UnitNotFound(unit_id))?;
    if unit.has_serial() {
        return Err(DaemonError::AlreadySerialized(unit_id));
    }

    if let Some(prefix) = &unit.sn_prefix {
        if !new_serial.as_str().to_uppercase().starts_with(&prefix.to_uppercase()) {
            return Err(DaemonError::SnPrefixMismatch { expected: prefix.clone() });
        }
    }

    tx.assign_serial(unit_id, new_serial, Some(user)).await?;
    tx.commit().await?;

    info!(unit_id, serial = %new_serial, user, "Serial assigned");
    Ok(())
}

/// Manually mark a serial sold (operator fix for a missed scan).
pub async fn fix_serial_status<S: Store>(store: &S, serial: &Serial) -> DaemonResult<()> {
    let mut tx = store.begin().await?;
    let rows = tx.set_sold(serial, true).await?;
    if rows == 0 {
        return Err(DaemonError::SerialNotFound(serial.to_string()));
    }
    tx.commit().await?;

    info!(serial = %serial, "Serial manually marked sold");
    Ok(())
}

/// Flag an existing unit damaged by serial.
pub async fn mark_damaged<S: Store>(store: &S, serial: &Serial) -> DaemonResult<()> {
    let mut tx = store.begin().await?;
    let rows = tx.set_damaged(serial, true).await?;
    if rows == 0 {
        return Err(DaemonError::SerialNotFound(serial.to_string()));
    }
    tx.commit().await?;

    info!(serial = %serial, "Unit marked damaged");
    Ok(())
}

/// Clear a unit's damage flag, optionally re-associating it with a new
/// product (repairs may swap or upgrade the part).
pub async fn mark_repaired<S: Store>(
    store: &S,
    unit_id: UnitId,
    new_product_id: Option<ProductId>,
) -> DaemonResult<()> {
    let mut tx = store.begin().await?;
    tx.find_unit(unit_id).await?.ok_or(DaemonError::UnitNotFound(unit_id))?;
    tx.repair_unit(unit_id, new_product_id).await?;
    tx.commit().await?;

    info!(unit_id, ?new_product_id, "Unit repaired");
    Ok(())
}

/// Dispose a unit. Terminal: a disposed unit cannot be disposed again or
/// re-enter any allocation path.
pub async fn dispose_unit<S: Store>(store: &S, unit_id: UnitId) -> DaemonResult<()> {
    let mut tx = store.begin().await?;
    let unit = tx.find_unit(unit_id).await?.ok_or(DaemonError::UnitNotFound(unit_id))?;
    if unit.disposed {
        return Err(DaemonError::UnitDisposed(unit_id));
    }
    tx.dispose_unit(unit_id).await?;
    tx.commit().await?;

    info!(unit_id, serial = %unit.serial, "Unit disposed");
    Ok(())
}

/// Resolve a pending review row, attributing the operator. Absent or
/// already-resolved rows report not-found rather than mutating anything.
pub async fn resolve_review<S: Store>(
    store: &S,
    order_id: &str,
    sku: &str,
    user: UserId,
) -> DaemonResult<()> {
    let mut tx = store.begin().await?;
    let rows = tx.resolve_review(order_id, sku, user).await?;
    if rows == 0 {
        return Err(DaemonError::ReviewNotFound {
            order_id: order_id.to_string(),
            sku: sku.to_string(),
        });
    }
    tx.commit().await?;

    info!(order_id, sku, user, "Review resolved");
    Ok(())
}

/// Unresolved review rows, newest first.
pub async fn pending_reviews<S: Store>(store: &S) -> DaemonResult<Vec<ManualReviewItem>> {
    let mut tx = store.begin().await?;
    let rows = tx.pending_reviews().await?;
    tx.rollback().await?;
    Ok(rows)
}
