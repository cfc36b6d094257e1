//! Expected-serial demand computation.
//!
//! Every line item demands `quantity × multiplier` scanned serials, where
//! the multiplier is 2 for bundled SKUs and 1 otherwise. The bundled
//! fallback (see `plan::reconcile_counts`) re-shapes demand to one serial
//! per ordered unit once the second unit has been drawn from the shared
//! pool instead.

use crate::classify::{SkuClass, SkuClassifier};
use tally_domain::OrderLine;

/// Demand for a single line item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineDemand {
    pub sku: String,
    pub quantity: u32,
    pub class: SkuClass,
    /// Serials this line consumes off the scanned list.
    pub expected_serials: u32,
}

/// Demand for a whole order, lines in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDemand {
    pub lines: Vec<LineDemand>,
    /// Sum of per-line expected serial counts.
    pub expected_total: u32,
    /// Sum of ordered quantities (multiplier-free).
    pub total_quantity: u32,
}

impl OrderDemand {
    /// Compute demand for an order's lines.
    pub fn compute(lines: &[OrderLine], classifier: &dyn SkuClassifier) -> Self {
        let mut demand_lines = Vec::with_capacity(lines.len());
        let mut expected_total = 0u32;
        let mut total_quantity = 0u32;

        for line in lines {
            let class = classifier.classify(&line.sku);
            let multiplier = match class {
                SkuClass::Bundled => 2,
                SkuClass::Plain | SkuClass::Subcomponent => 1,
            };
            let expected = line.quantity * multiplier;
            expected_total += expected;
            total_quantity += line.quantity;
            demand_lines.push(LineDemand {
                sku: line.sku.clone(),
                quantity: line.quantity,
                class,
                expected_serials: expected,
            });
        }

        Self { lines: demand_lines, expected_total, total_quantity }
    }

    /// Whether every line is a bundled SKU (vacuously false for an empty
    /// order, which can never take the fallback path).
    pub fn all_bundled(&self) -> bool {
        !self.lines.is_empty() && self.lines.iter().all(|l| l.class == SkuClass::Bundled)
    }

    /// Total ordered quantity across lines requiring the shared
    /// sub-component.
    pub fn subcomponent_quantity(&self) -> u32 {
        self.lines
            .iter()
            .filter(|l| l.class == SkuClass::Subcomponent)
            .map(|l| l.quantity)
            .sum()
    }

    /// Distinct SKUs in line order, for per-SKU review insertion.
    pub fn distinct_skus(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for line in &self.lines {
            if !seen.contains(&line.sku.as_str()) {
                seen.push(line.sku.as_str());
            }
        }
        seen
    }

    /// Re-shape demand after the bundled fallback: the pool covered the
    /// second unit of every bundle, so each line now expects one serial per
    /// ordered unit.
    pub fn reduce_to_single(&mut self) {
        for line in &mut self.lines {
            line.expected_serials = line.quantity;
        }
        self.expected_total = self.total_quantity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::KeywordClassifier;

    fn classifier() -> KeywordClassifier {
        KeywordClassifier::default()
    }

    #[test]
    fn test_plain_demand_is_quantity() {
        let lines = vec![OrderLine::new("SKU-A", 2), OrderLine::new("SKU-B", 1)];
        let demand = OrderDemand::compute(&lines, &classifier());
        assert_eq!(demand.expected_total, 3);
        assert_eq!(demand.total_quantity, 3);
        assert!(!demand.all_bundled());
    }

    #[test]
    fn test_bundled_demand_doubles() {
        let lines = vec![OrderLine::new("LAPTOP+512GB", 3)];
        let demand = OrderDemand::compute(&lines, &classifier());
        assert_eq!(demand.expected_total, 6);
        assert_eq!(demand.total_quantity, 3);
        assert!(demand.all_bundled());
    }

    #[test]
    fn test_mixed_order_is_not_all_bundled() {
        let lines = vec![OrderLine::new("LAPTOP+512GB", 1), OrderLine::new("SKU-B", 1)];
        let demand = OrderDemand::compute(&lines, &classifier());
        assert_eq!(demand.expected_total, 3);
        assert!(!demand.all_bundled());
    }

    #[test]
    fn test_empty_order_never_all_bundled() {
        let demand = OrderDemand::compute(&[], &classifier());
        assert!(!demand.all_bundled());
        assert_eq!(demand.expected_total, 0);
    }

    #[test]
    fn test_subcomponent_quantity() {
        let lines = vec![
            OrderLine::new("LAPTOP+1TB", 2),
            OrderLine::new("SKU-B", 4),
            OrderLine::new("B0D1D5J1J1", 1),
        ];
        let demand = OrderDemand::compute(&lines, &classifier());
        assert_eq!(demand.subcomponent_quantity(), 3);
        // Sub-component lines still expect one serial per unit.
        assert_eq!(demand.expected_total, 7);
    }

    #[test]
    fn test_reduce_to_single_after_fallback() {
        let lines = vec![OrderLine::new("LAPTOP+512GB", 3)];
        let mut demand = OrderDemand::compute(&lines, &classifier());
        demand.reduce_to_single();
        assert_eq!(demand.expected_total, 3);
        assert_eq!(demand.lines[0].expected_serials, 3);
        // Classification is unchanged, only the serial demand shrinks.
        assert_eq!(demand.lines[0].class, SkuClass::Bundled);
    }

    #[test]
    fn test_distinct_skus_dedupes_in_order() {
        let lines = vec![
            OrderLine::new("SKU-A", 1),
            OrderLine::new("SKU-B", 1),
            OrderLine::new("SKU-A", 2),
        ];
        let demand = OrderDemand::compute(&lines, &classifier());
        assert_eq!(demand.distinct_skus(), vec!["SKU-A", "SKU-B"]);
    }
}
