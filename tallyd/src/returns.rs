//! Return processing.
//!
//! A sold serial scanned back at the warehouse re-enters stock by trading
//! places with a placeholder (untagged) unit of the same product family:
//! the original unit's state is archived to the returns table, the unit is
//! reset to unsold under the return PO marker, and the placeholder row is
//! deleted. Four steps, one transaction; any failure leaves the sold state
//! untouched.

use tracing::info;

use tally_domain::{Serial, UnitId, UserId};
use tally_store::{Store, StoreTx};

use crate::error::{DaemonError, DaemonResult};

/// Process a return scan.
///
/// # Errors
/// - `SerialNotFound` when the scanned serial is unknown
/// - `SerialNotSold` when the unit is already in stock
/// - `PlaceholderNotFound` when the placeholder is missing or already tagged
/// - `MasterSkuMismatch` when the placeholder's product family differs
pub async fn process_return<S: Store>(
    store: &S,
    scanned_serial: &Serial,
    placeholder_unit_id: UnitId,
    operator: Option<UserId>,
) -> DaemonResult<()> {
    let mut tx = store.begin().await?;

    // 1. The scanned serial must exist and be sold.
    let original = tx
        .find_unit_by_serial(scanned_serial)
        .await?
        .ok_or_else(|| DaemonError::SerialNotFound(scanned_serial.to_string()))?;
    if !original.sold {
        return Err(DaemonError::SerialNotSold(scanned_serial.to_string()));
    }

    // 2. The placeholder must be an untagged unit of the same family.
    let placeholder = tx
        .find_unit(placeholder_unit_id)
        .await?
        .filter(|unit| unit.serial.is_sentinel())
        .ok_or(DaemonError::PlaceholderNotFound(placeholder_unit_id))?;

    let original_product = tx
        .find_product(original.product_id)
        .await?
        .ok_or(DaemonError::UnitNotFound(original.unit_id))?;
    let placeholder_product = tx
        .find_product(placeholder.product_id)
        .await?
        .ok_or(DaemonError::PlaceholderNotFound(placeholder.unit_id))?;

    if original_product.master_sku_id != placeholder_product.master_sku_id {
        return Err(DaemonError::MasterSkuMismatch);
    }

    // 3. Archive the original unit's state, then 4. reset it into stock and
    // drop the placeholder.
    tx.archive_return(&original).await?;
    tx.reset_returned_unit(original.unit_id).await?;
    tx.delete_unit(placeholder.unit_id).await?;

    tx.commit().await?;

    info!(
        serial = %scanned_serial,
        unit_id = original.unit_id,
        placeholder_unit_id,
        operator = ?operator,
        "Return processed"
    );

    Ok(())
}
