//! Order-to-serial reconciliation.
//!
//! Walks a batch of shipped orders and, per order, inside one store
//! transaction:
//!
//! 1. **Guard**: skip any order that already has inventory-log entries.
//!    Orders previously routed to review have none and are re-evaluated
//!    every cycle until resolved; that re-submission is the retry model.
//! 2. **Demand**: expected serial count per line (bundles count double).
//! 3. **Counts**: exact match proceeds; an all-bundle order with exactly
//!    one serial per unit takes the pool fallback; anything else goes to
//!    manual review untouched.
//! 4. **Validation**: every scanned serial must exist unsold, or the whole
//!    order goes to review with nothing committed.
//! 5. **Commit**: serials bind to lines front-to-back, log entries append,
//!    units flip to sold.
//! 6. **Sub-components**: post-cutoff, non-return orders draw their shared
//!    sub-component demand from the pool: hard stock first (oldest
//!    assigned), then additive soft allocation, then a review row for any
//!    shortfall (the sale itself stands).
//!
//! A failed order rolls back alone; the rest of the batch continues.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use tally_domain::{LogEntry, NewReviewItem, Serial, ShippedOrder};
use tally_engine::{
    plan_bindings, plan_soft_allocation, reconcile_counts, CountOutcome, OrderDemand,
    SkuClassifier,
};
use tally_store::{Store, StoreTx};

use crate::config::ReconConfig;
use crate::error::DaemonResult;

// =============================================================================
// Outcomes
// =============================================================================

/// Why an order was routed to manual review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewReason {
    /// Scanned serial count disagrees with demand and no fallback applies.
    CountMismatch { expected: u32, scanned: u32 },
    /// A scanned serial does not exist in the unit store.
    InvalidSerial { serial: Serial },
    /// A scanned serial is already marked sold.
    AlreadySold { serial: Serial },
}

/// Per-order result of a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderOutcome {
    /// The idempotency guard found existing log entries; nothing was done.
    AlreadyProcessed,
    /// The order committed.
    Committed {
        serials_sold: usize,
        unused_serials: usize,
        /// Sub-component demand that neither hard nor soft allocation
        /// could place (flagged for review, sale kept).
        subcomponent_shortfall: i64,
    },
    /// The order was routed to manual review, untouched.
    SentToReview { reason: ReviewReason },
}

/// Aggregate result of one reconciliation cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub cycle_id: Uuid,
    pub orders_seen: usize,
    pub committed: usize,
    pub skipped: usize,
    pub sent_to_review: usize,
    pub failed: usize,
    pub serials_sold: usize,
}

// =============================================================================
// Reconciler
// =============================================================================

/// The reconciliation service. Sole writer of sold/serial-binding state;
/// every per-order mutation set runs in one store transaction.
pub struct Reconciler<S: Store> {
    store: Arc<S>,
    classifier: Arc<dyn SkuClassifier>,
    config: ReconConfig,
}

impl<S: Store> Reconciler<S> {
    pub fn new(store: Arc<S>, classifier: Arc<dyn SkuClassifier>, config: ReconConfig) -> Self {
        Self { store, classifier, config }
    }

    /// Process a fetched batch. Each order is its own transaction; a
    /// failure rolls that order back and the batch moves on.
    pub async fn run_batch(&self, orders: &[ShippedOrder]) -> CycleSummary {
        let cycle_id = Uuid::now_v7();
        let mut summary = CycleSummary {
            cycle_id,
            orders_seen: orders.len(),
            committed: 0,
            skipped: 0,
            sent_to_review: 0,
            failed: 0,
            serials_sold: 0,
        };

        for order in orders {
            match self.process_order(order).await {
                Ok(OrderOutcome::AlreadyProcessed) => summary.skipped += 1,
                Ok(OrderOutcome::Committed { serials_sold, .. }) => {
                    summary.committed += 1;
                    summary.serials_sold += serials_sold;
                },
                Ok(OrderOutcome::SentToReview { .. }) => summary.sent_to_review += 1,
                Err(e) => {
                    error!(
                        cycle_id = %cycle_id,
                        order_id = %order.order_id,
                        error = %e,
                        "Order rolled back; it will be retried next cycle"
                    );
                    summary.failed += 1;
                },
            }
        }

        info!(
            cycle_id = %cycle_id,
            orders = summary.orders_seen,
            committed = summary.committed,
            skipped = summary.skipped,
            sent_to_review = summary.sent_to_review,
            failed = summary.failed,
            serials_sold = summary.serials_sold,
            "Reconciliation cycle complete"
        );

        summary
    }

    /// Reconcile a single order atomically.
    pub async fn process_order(&self, order: &ShippedOrder) -> DaemonResult<OrderOutcome> {
        let mut tx = self.store.begin().await?;

        // Idempotency guard: an order with any logged sale is done.
        if tx.order_has_sales(&order.order_id).await? {
            debug!(order_id = %order.order_id, "Order already processed, skipping");
            tx.rollback().await?;
            return Ok(OrderOutcome::AlreadyProcessed);
        }

        let mut demand = OrderDemand::compute(&order.lines, self.classifier.as_ref());

        match reconcile_counts(&demand, order.serials.len()) {
            CountOutcome::Matched => {},
            CountOutcome::BundledFallback { pool_units } => {
                let allocated = self.consume_fallback_pool(&mut *tx, order, pool_units).await?;
                if allocated < pool_units {
                    warn!(
                        order_id = %order.order_id,
                        allocated,
                        short = pool_units - allocated,
                        "Fallback pool exhausted, continuing with partial allocation"
                    );
                }
                demand.reduce_to_single();
            },
            CountOutcome::Mismatch { expected, scanned } => {
                warn!(
                    order_id = %order.order_id,
                    expected,
                    scanned,
                    "Serial count mismatch, routing to manual review"
                );
                return self
                    .send_to_review(
                        tx,
                        order,
                        &demand,
                        ReviewReason::CountMismatch { expected, scanned },
                    )
                    .await;
            },
        }

        // Serial validation: all-or-nothing. Any bad serial rejects the
        // whole order before a single unit is touched.
        for serial in &order.serials {
            let reason = match tx.find_unit_by_serial(serial).await? {
                None => Some(ReviewReason::InvalidSerial { serial: serial.clone() }),
                Some(unit) if unit.sold => Some(ReviewReason::AlreadySold { serial: serial.clone() }),
                Some(_) => None,
            };
            if let Some(reason) = reason {
                warn!(
                    order_id = %order.order_id,
                    serial = %serial,
                    ?reason,
                    "Serial validation failed, routing to manual review"
                );
                return self.send_to_review(tx, order, &demand, reason).await;
            }
        }

        // Commit: bind serials to lines front-to-back.
        let plan = plan_bindings(&demand, &order.serials)?;
        for binding in &plan.bindings {
            let entry = LogEntry {
                sku: binding.sku.clone(),
                serial: binding.serial.clone(),
                order_id: order.order_id.clone(),
                event_time: order.shipped_at,
            };
            tx.insert_log_entry(&entry).await?;
            tx.set_sold(&binding.serial, true).await?;
        }
        if !plan.unused.is_empty() {
            info!(
                order_id = %order.order_id,
                unused = ?plan.unused.iter().map(Serial::as_str).collect::<Vec<_>>(),
                "Unused serials left after binding"
            );
        }

        // Sub-component allocation for post-cutoff, non-return orders.
        let mut shortfall = 0i64;
        if order.shipped_at >= self.config.cutoff_date {
            if tx.is_return_order(&order.order_id).await? {
                debug!(order_id = %order.order_id, "Return order, skipping sub-component allocation");
            } else {
                shortfall = self.allocate_subcomponents(&mut *tx, order, &demand).await?;
            }
        }

        tx.commit().await?;

        Ok(OrderOutcome::Committed {
            serials_sold: plan.bindings.len(),
            unused_serials: plan.unused.len(),
            subcomponent_shortfall: shortfall,
        })
    }

    /// Abandon the order's staged mutations and persist only review rows,
    /// one per distinct (order, sku). Keeps the "order left untouched"
    /// guarantee even when the fallback already staged pool allocations.
    async fn send_to_review(
        &self,
        tx: Box<dyn StoreTx>,
        order: &ShippedOrder,
        demand: &OrderDemand,
        reason: ReviewReason,
    ) -> DaemonResult<OrderOutcome> {
        tx.rollback().await?;

        let mut review_tx = self.store.begin().await?;
        for sku in demand.distinct_skus() {
            review_tx
                .insert_review_if_absent(&NewReviewItem::new(&order.order_id, sku, order.shipped_at))
                .await?;
        }
        review_tx.commit().await?;

        Ok(OrderOutcome::SentToReview { reason })
    }

    /// Bundled fallback: soft-consume one pool unit per ordered bundle,
    /// always draining the product holding the oldest stock that still has
    /// slack. Exhaustion is a partial allocation, not a failure.
    async fn consume_fallback_pool(
        &self,
        tx: &mut dyn StoreTx,
        order: &ShippedOrder,
        pool_units: u32,
    ) -> DaemonResult<u32> {
        info!(
            order_id = %order.order_id,
            scanned = order.serials.len(),
            pool_units,
            "Bundled fallback: drawing second units from the shared pool"
        );

        let mut allocated = 0u32;
        for _ in 0..pool_units {
            match tx.pick_fallback_product(self.config.bundle_pool).await? {
                Some(product_id) => {
                    tx.add_soft_allocation(product_id, &order.order_id, 1, order.shipped_at)
                        .await?;
                    allocated += 1;
                },
                None => break,
            }
        }
        Ok(allocated)
    }

    /// Place the order's shared sub-component demand: hard stock first
    /// (oldest assigned), then soft allocation, then a review row for the
    /// rest. Returns the unplaced quantity.
    async fn allocate_subcomponents(
        &self,
        tx: &mut dyn StoreTx,
        order: &ShippedOrder,
        demand: &OrderDemand,
    ) -> DaemonResult<i64> {
        let needed = demand.subcomponent_quantity() as i64;
        if needed == 0 {
            return Ok(0);
        }
        let pool = self.config.subcomponent_pool;

        // Serials already logged from the pool (scanned sub-components
        // count toward the demand).
        let already = tx.count_pool_sales(&order.order_id, pool).await?;
        let mut remaining = (needed - already).max(0);

        if remaining > 0 {
            let units = tx.oldest_unsold_in_pool(pool, remaining).await?;
            if (units.len() as i64) < remaining {
                warn!(
                    order_id = %order.order_id,
                    found = units.len(),
                    needed = remaining,
                    "Sub-component stock short of hard-allocation demand"
                );
            }
            for unit in &units {
                let entry = LogEntry {
                    sku: self.config.subcomponent_sku.clone(),
                    serial: unit.serial.clone(),
                    order_id: order.order_id.clone(),
                    event_time: order.shipped_at,
                };
                tx.insert_log_entry(&entry).await?;
                tx.set_sold(&unit.serial, true).await?;
                info!(
                    order_id = %order.order_id,
                    serial = %unit.serial,
                    "Hard-allocated sub-component unit"
                );
            }
            remaining -= units.len() as i64;
        }

        if remaining <= 0 {
            return Ok(0);
        }

        info!(
            order_id = %order.order_id,
            quantity = remaining,
            "Soft-allocating sub-component demand"
        );
        let available = tx.available_by_pool(pool).await?;
        let plan = plan_soft_allocation(remaining, &available);
        for step in &plan.steps {
            tx.add_soft_allocation(step.product_id, &order.order_id, step.quantity, order.shipped_at)
                .await?;
        }

        if plan.shortfall > 0 {
            warn!(
                order_id = %order.order_id,
                unallocated = plan.shortfall,
                "Sub-component demand unplaceable, flagging for review"
            );
            tx.insert_review_if_absent(
                &NewReviewItem::new(&order.order_id, &self.config.subcomponent_sku, order.shipped_at)
                    .with_reason("Soft allocation failed")
                    .with_metadata(json!({
                        "pool_id": pool,
                        "requested": remaining,
                        "allocated": plan.allocated(),
                        "unallocated": plan.shortfall,
                    })),
            )
            .await?;
        }

        Ok(plan.shortfall)
    }
}
