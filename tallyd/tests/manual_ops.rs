//! Operator-triggered unit and review operations.

use std::sync::Arc;

use chrono::Utc;
use tally_domain::{NewReviewItem, Serial};
use tally_store::{MemoryStore, Store, StoreTx};
use tally_testkit::{seed_product, seed_tagged_unit, seed_unit, SeedUnit};
use tallyd::DaemonError;
use tallyd::manual::{
    add_delivery, assign_serial, dispose_unit, fix_serial_status, mark_damaged, mark_repaired,
    pending_reviews, resolve_review,
};

fn serial(raw: &str) -> Serial {
    Serial::new(raw).unwrap()
}

#[tokio::test]
async fn delivery_intake_creates_untagged_units() {
    let store = Arc::new(MemoryStore::new());
    let product = seed_product(store.as_ref(), "SKU-A", "MSKU-1", None).await.unwrap();

    let ids = add_delivery(store.as_ref(), product, 3, "PO700", Some("5C"), false)
        .await
        .unwrap();
    assert_eq!(ids.len(), 3);

    let mut tx = store.begin().await.unwrap();
    let unit = tx.find_unit(ids[0]).await.unwrap().unwrap();
    assert!(unit.serial.is_sentinel());
    assert_eq!(unit.po_number, "PO700");
    assert_eq!(unit.sn_prefix.as_deref(), Some("5C"));
}

#[tokio::test]
async fn delivery_intake_validates_inputs() {
    let store = Arc::new(MemoryStore::new());
    let product = seed_product(store.as_ref(), "SKU-A", "MSKU-1", None).await.unwrap();

    // Zero quantity
    assert!(matches!(
        add_delivery(store.as_ref(), product, 0, "PO700", None, false).await,
        Err(DaemonError::Domain(_))
    ));
    // PO shaped like an order id
    assert!(matches!(
        add_delivery(store.as_ref(), product, 1, "11-40213", None, false).await,
        Err(DaemonError::Domain(_))
    ));
    // Malformed SN prefix
    assert!(matches!(
        add_delivery(store.as_ref(), product, 1, "PO700", Some("ABC"), false).await,
        Err(DaemonError::Domain(_))
    ));
}

#[tokio::test]
async fn assign_serial_enforces_prefix_and_uniqueness() {
    let store = Arc::new(MemoryStore::new());
    let product = seed_product(store.as_ref(), "SKU-A", "MSKU-1", None).await.unwrap();

    let constrained = seed_unit(
        store.as_ref(),
        product,
        SeedUnit { sn_prefix: Some("5C"), ..Default::default() },
    )
    .await
    .unwrap();
    let free = seed_unit(store.as_ref(), product, SeedUnit::default()).await.unwrap();

    // Prefix mismatch is rejected; match is case-insensitive.
    let err = assign_serial(store.as_ref(), constrained, &serial("XX123"), 1).await.unwrap_err();
    assert!(matches!(err, DaemonError::SnPrefixMismatch { .. }));
    assign_serial(store.as_ref(), constrained, &serial("5c-123"), 1).await.unwrap();

    // The same serial cannot be assigned twice anywhere in the store.
    let err = assign_serial(store.as_ref(), free, &serial("5c-123"), 1).await.unwrap_err();
    assert!(matches!(err, DaemonError::SerialAlreadyExists(_)));

    let mut tx = store.begin().await.unwrap();
    let unit = tx.find_unit(constrained).await.unwrap().unwrap();
    assert_eq!(unit.serial.as_str(), "5c-123");
    assert_eq!(unit.assigned_by, Some(1));
}

#[tokio::test]
async fn assign_serial_only_applies_to_untagged_units() {
    let store = Arc::new(MemoryStore::new());
    let product = seed_product(store.as_ref(), "SKU-A", "MSKU-1", None).await.unwrap();
    let tagged = seed_tagged_unit(store.as_ref(), product, "SN1").await.unwrap();
    let untagged = seed_unit(store.as_ref(), product, SeedUnit::default()).await.unwrap();

    let err = assign_serial(store.as_ref(), tagged, &serial("SN2"), 1).await.unwrap_err();
    assert!(matches!(err, DaemonError::AlreadySerialized(_)));

    let err = assign_serial(store.as_ref(), untagged, &Serial::sentinel(), 1).await.unwrap_err();
    assert!(matches!(err, DaemonError::Domain(_)));

    let err = assign_serial(store.as_ref(), 9999, &serial("SN2"), 1).await.unwrap_err();
    assert!(matches!(err, DaemonError::UnitNotFound(9999)));
}

#[tokio::test]
async fn fix_serial_status_marks_sold() {
    let store = Arc::new(MemoryStore::new());
    let product = seed_product(store.as_ref(), "SKU-A", "MSKU-1", None).await.unwrap();
    seed_tagged_unit(store.as_ref(), product, "SN1").await.unwrap();

    fix_serial_status(store.as_ref(), &serial("SN1")).await.unwrap();

    let mut tx = store.begin().await.unwrap();
    assert!(tx.find_unit_by_serial(&serial("SN1")).await.unwrap().unwrap().sold);
    drop(tx);

    let err = fix_serial_status(store.as_ref(), &serial("GHOST")).await.unwrap_err();
    assert!(matches!(err, DaemonError::SerialNotFound(_)));
}

#[tokio::test]
async fn damage_repair_lifecycle() {
    let store = Arc::new(MemoryStore::new());
    let product = seed_product(store.as_ref(), "SKU-A", "MSKU-1", None).await.unwrap();
    let upgraded = seed_product(store.as_ref(), "SKU-A2", "MSKU-1", None).await.unwrap();
    let unit_id = seed_tagged_unit(store.as_ref(), product, "SN1").await.unwrap();

    mark_damaged(store.as_ref(), &serial("SN1")).await.unwrap();
    {
        let mut tx = store.begin().await.unwrap();
        assert!(tx.find_unit(unit_id).await.unwrap().unwrap().is_damaged);
    }

    // Repair clears damage and may move the unit to a new product.
    mark_repaired(store.as_ref(), unit_id, Some(upgraded)).await.unwrap();
    let mut tx = store.begin().await.unwrap();
    let unit = tx.find_unit(unit_id).await.unwrap().unwrap();
    assert!(!unit.is_damaged);
    assert_eq!(unit.product_id, upgraded);
}

#[tokio::test]
async fn dispose_is_terminal() {
    let store = Arc::new(MemoryStore::new());
    let product = seed_product(store.as_ref(), "SKU-A", "MSKU-1", None).await.unwrap();
    let unit_id = seed_tagged_unit(store.as_ref(), product, "SN1").await.unwrap();

    dispose_unit(store.as_ref(), unit_id).await.unwrap();

    let err = dispose_unit(store.as_ref(), unit_id).await.unwrap_err();
    assert!(matches!(err, DaemonError::UnitDisposed(_)));

    let err = dispose_unit(store.as_ref(), 9999).await.unwrap_err();
    assert!(matches!(err, DaemonError::UnitNotFound(9999)));
}

#[tokio::test]
async fn resolve_review_is_exactly_once() {
    let store = Arc::new(MemoryStore::new());

    {
        let mut tx = store.begin().await.unwrap();
        tx.insert_review_if_absent(&NewReviewItem::new("ORD-1", "SKU-A", Utc::now()))
            .await
            .unwrap();
        tx.commit().await.unwrap();
    }

    assert_eq!(pending_reviews(store.as_ref()).await.unwrap().len(), 1);
    resolve_review(store.as_ref(), "ORD-1", "SKU-A", 42).await.unwrap();
    assert!(pending_reviews(store.as_ref()).await.unwrap().is_empty());

    // Absent or already-resolved resolves report not-found, not a crash.
    let err = resolve_review(store.as_ref(), "ORD-1", "SKU-A", 42).await.unwrap_err();
    assert!(matches!(err, DaemonError::ReviewNotFound { .. }));
    let err = resolve_review(store.as_ref(), "ORD-9", "SKU-Z", 42).await.unwrap_err();
    assert!(matches!(err, DaemonError::ReviewNotFound { .. }));
}
