//! Store-seeding helpers.
//!
//! Each helper runs its own transaction so tests can seed state and then
//! exercise the code under test against a clean store handle.

use anyhow::Result;
use tally_domain::{PoolId, Product, ProductId, Serial, UnitId};
use tally_store::{Store, StoreTx};

/// Seed a catalog product. Returns the assigned product id.
pub async fn seed_product<S: Store>(
    store: &S,
    part_number: &str,
    master_sku_id: &str,
    pool_id: Option<PoolId>,
) -> Result<ProductId> {
    let mut tx = store.begin().await?;
    let id = tx
        .insert_product(&Product {
            product_id: 0,
            part_number: part_number.to_string(),
            product_name: format!("{} product", part_number),
            master_sku_id: master_sku_id.to_string(),
            pool_id,
        })
        .await?;
    tx.commit().await?;
    Ok(id)
}

/// Options for seeding a single inventory unit.
pub struct SeedUnit<'a> {
    /// Real serial to assign, or None to leave the unit untagged.
    pub serial: Option<&'a str>,
    pub sold: bool,
    pub damaged: bool,
    pub po_number: &'a str,
    pub sn_prefix: Option<&'a str>,
}

impl Default for SeedUnit<'_> {
    fn default() -> Self {
        Self { serial: None, sold: false, damaged: false, po_number: "PO100", sn_prefix: None }
    }
}

/// Seed one unit with the given options. Returns the unit id.
pub async fn seed_unit<S: Store>(
    store: &S,
    product_id: ProductId,
    options: SeedUnit<'_>,
) -> Result<UnitId> {
    let mut tx = store.begin().await?;
    let ids = tx
        .insert_units(product_id, 1, options.po_number, options.sn_prefix, options.damaged)
        .await?;
    let unit_id = ids[0];

    if let Some(raw) = options.serial {
        let serial = Serial::new(raw)?;
        tx.assign_serial(unit_id, &serial, None).await?;
        if options.sold {
            tx.set_sold(&serial, true).await?;
        }
    }

    tx.commit().await?;
    Ok(unit_id)
}

/// Seed an unsold, undamaged unit carrying `serial` (the common case).
pub async fn seed_tagged_unit<S: Store>(
    store: &S,
    product_id: ProductId,
    serial: &str,
) -> Result<UnitId> {
    seed_unit(store, product_id, SeedUnit { serial: Some(serial), ..Default::default() }).await
}
