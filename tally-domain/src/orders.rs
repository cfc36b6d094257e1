//! Domain form of a shipped order.
//!
//! Fetched from the external order API and normalized before the engine
//! sees it: notes become candidate serials (trimmed, empties dropped) and
//! line items are flattened across allocations, both in source order.
//! Orders are never persisted in this form; the inventory log is the only
//! durable trace of a sale.

use crate::value_objects::Serial;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One line item of a shipped order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub sku: String,
    pub quantity: u32,
}

impl OrderLine {
    pub fn new(sku: impl Into<String>, quantity: u32) -> Self {
        Self { sku: sku.into(), quantity }
    }
}

/// A shipped order as the reconciliation engine consumes it.
///
/// Ordering matters: serials are consumed front-to-back against lines in
/// their given order, so both vectors preserve the upstream sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShippedOrder {
    pub order_id: String,
    pub shipped_at: DateTime<Utc>,
    pub serials: Vec<Serial>,
    pub lines: Vec<OrderLine>,
}

impl ShippedOrder {
    /// Total ordered quantity across all lines.
    pub fn total_quantity(&self) -> u32 {
        self.lines.iter().map(|line| line.quantity).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_quantity() {
        let order = ShippedOrder {
            order_id: "11-100".to_string(),
            shipped_at: Utc::now(),
            serials: vec![],
            lines: vec![OrderLine::new("SKU-A", 2), OrderLine::new("SKU-B", 3)],
        };
        assert_eq!(order.total_quantity(), 5);
    }
}
