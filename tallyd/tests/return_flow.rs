//! Return-processing scenarios against the in-memory store.

use std::sync::Arc;

use tally_domain::{Serial, RETURN_PO_MARKER};
use tally_store::{MemoryStore, Store, StoreTx};
use tally_testkit::{seed_product, seed_unit, SeedUnit};
use tallyd::{process_return, DaemonError};

fn serial(raw: &str) -> Serial {
    Serial::new(raw).unwrap()
}

#[tokio::test]
async fn return_roundtrip_archives_and_restocks() {
    let store = Arc::new(MemoryStore::new());
    let sold_product = seed_product(store.as_ref(), "SKU-A", "MSKU-1", None).await.unwrap();
    let replacement = seed_product(store.as_ref(), "SKU-B", "MSKU-1", None).await.unwrap();

    let unit_id = seed_unit(
        store.as_ref(),
        sold_product,
        SeedUnit { serial: Some("SN1"), sold: true, po_number: "PO500", ..Default::default() },
    )
    .await
    .unwrap();
    let placeholder_id = seed_unit(store.as_ref(), replacement, SeedUnit::default()).await.unwrap();

    let assigned_at_before = {
        let mut tx = store.begin().await.unwrap();
        tx.find_unit(unit_id).await.unwrap().unwrap().serial_assigned_at
    };

    process_return(store.as_ref(), &serial("SN1"), placeholder_id, Some(7)).await.unwrap();

    let mut tx = store.begin().await.unwrap();

    // The unit is back in stock under the return marker, with a fresh
    // assignment timestamp.
    let unit = tx.find_unit(unit_id).await.unwrap().unwrap();
    assert!(!unit.sold);
    assert_eq!(unit.po_number, RETURN_PO_MARKER);
    assert_eq!(unit.serial.as_str(), "SN1");
    assert!(unit.serial_assigned_at >= assigned_at_before);

    // The archive preserves the pre-return state, including the original
    // assignment timestamp and sold flag.
    let records = tx.returns_for_unit(unit_id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].serial.as_str(), "SN1");
    assert_eq!(records[0].serial_assigned_at, assigned_at_before);
    assert_eq!(records[0].po_number, "PO500");
    assert!(records[0].sold);

    // The placeholder slot is consumed.
    assert!(tx.find_unit(placeholder_id).await.unwrap().is_none());
}

#[tokio::test]
async fn return_rejects_master_sku_mismatch_without_mutation() {
    let store = Arc::new(MemoryStore::new());
    let sold_product = seed_product(store.as_ref(), "SKU-A", "MSKU-1", None).await.unwrap();
    let other_family = seed_product(store.as_ref(), "SKU-C", "MSKU-2", None).await.unwrap();

    let unit_id = seed_unit(
        store.as_ref(),
        sold_product,
        SeedUnit { serial: Some("SN1"), sold: true, ..Default::default() },
    )
    .await
    .unwrap();
    let placeholder_id = seed_unit(store.as_ref(), other_family, SeedUnit::default()).await.unwrap();

    let err = process_return(store.as_ref(), &serial("SN1"), placeholder_id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, DaemonError::MasterSkuMismatch));

    // Nothing changed.
    let mut tx = store.begin().await.unwrap();
    assert!(tx.find_unit(unit_id).await.unwrap().unwrap().sold);
    assert!(tx.find_unit(placeholder_id).await.unwrap().is_some());
    assert!(tx.returns_for_unit(unit_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn return_rejects_serial_still_in_stock() {
    let store = Arc::new(MemoryStore::new());
    let product = seed_product(store.as_ref(), "SKU-A", "MSKU-1", None).await.unwrap();
    seed_unit(
        store.as_ref(),
        product,
        SeedUnit { serial: Some("SN1"), sold: false, ..Default::default() },
    )
    .await
    .unwrap();
    let placeholder_id = seed_unit(store.as_ref(), product, SeedUnit::default()).await.unwrap();

    let err = process_return(store.as_ref(), &serial("SN1"), placeholder_id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, DaemonError::SerialNotSold(_)));
}

#[tokio::test]
async fn return_rejects_unknown_serial() {
    let store = Arc::new(MemoryStore::new());
    let product = seed_product(store.as_ref(), "SKU-A", "MSKU-1", None).await.unwrap();
    let placeholder_id = seed_unit(store.as_ref(), product, SeedUnit::default()).await.unwrap();

    let err = process_return(store.as_ref(), &serial("GHOST"), placeholder_id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, DaemonError::SerialNotFound(_)));
}

#[tokio::test]
async fn return_placeholder_must_be_untagged() {
    let store = Arc::new(MemoryStore::new());
    let product = seed_product(store.as_ref(), "SKU-A", "MSKU-1", None).await.unwrap();
    seed_unit(
        store.as_ref(),
        product,
        SeedUnit { serial: Some("SN1"), sold: true, ..Default::default() },
    )
    .await
    .unwrap();
    // "Placeholder" already carries a real serial.
    let tagged_id = seed_unit(
        store.as_ref(),
        product,
        SeedUnit { serial: Some("SN2"), ..Default::default() },
    )
    .await
    .unwrap();

    let err = process_return(store.as_ref(), &serial("SN1"), tagged_id, None).await.unwrap_err();
    assert!(matches!(err, DaemonError::PlaceholderNotFound(_)));
}
