//! Builders for domain test fixtures.

use chrono::{DateTime, Utc};
use tally_domain::{OrderLine, Serial, ShippedOrder};

/// Fluent builder for a [`ShippedOrder`].
///
/// ```
/// # use tally_testkit::OrderBuilder;
/// let order = OrderBuilder::new("11-100")
///     .line("SKU-A", 2)
///     .line("SKU-B", 1)
///     .serials(&["S1", "S2", "S3"])
///     .build();
/// assert_eq!(order.total_quantity(), 3);
/// ```
pub struct OrderBuilder {
    order_id: String,
    shipped_at: DateTime<Utc>,
    lines: Vec<OrderLine>,
    serials: Vec<Serial>,
}

impl OrderBuilder {
    /// Start building an order shipped now.
    pub fn new(order_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            shipped_at: Utc::now(),
            lines: Vec::new(),
            serials: Vec::new(),
        }
    }

    /// Override the shipped timestamp.
    pub fn shipped_at(mut self, shipped_at: DateTime<Utc>) -> Self {
        self.shipped_at = shipped_at;
        self
    }

    /// Append a line item.
    pub fn line(mut self, sku: impl Into<String>, quantity: u32) -> Self {
        self.lines.push(OrderLine { sku: sku.into(), quantity });
        self
    }

    /// Append one scanned serial.
    pub fn serial(mut self, serial: &str) -> Self {
        self.serials.push(Serial::new(serial).expect("valid test serial"));
        self
    }

    /// Append several scanned serials in order.
    pub fn serials(mut self, serials: &[&str]) -> Self {
        for serial in serials {
            self.serials.push(Serial::new(*serial).expect("valid test serial"));
        }
        self
    }

    pub fn build(self) -> ShippedOrder {
        ShippedOrder {
            order_id: self.order_id,
            shipped_at: self.shipped_at,
            serials: self.serials,
            lines: self.lines,
        }
    }
}
