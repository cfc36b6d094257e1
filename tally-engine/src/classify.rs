//! SKU classification.
//!
//! Sellable SKU codes encode fulfillment behavior in their suffixes
//! (e.g. a "+512gb" variant ships two serialized units, a "+1tb" variant
//! consumes one unit from the shared storage pool). The matching rules are
//! fragile keyword lists, so they live behind a trait and are injected
//! into the engine rather than hard-coded in it.

/// How a SKU is fulfilled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkuClass {
    /// One serialized unit per ordered quantity.
    Plain,
    /// Two serialized units per ordered quantity (doubled-capacity bundle).
    Bundled,
    /// One serialized unit per ordered quantity, plus one shared
    /// sub-component (e.g. a storage module) drawn from a pool.
    Subcomponent,
}

/// Pluggable SKU classification capability.
pub trait SkuClassifier: Send + Sync {
    /// Classify a raw SKU code.
    fn classify(&self, sku: &str) -> SkuClass;
}

/// Classifier driven by case-insensitive substring keyword lists.
///
/// Bundled wins when a SKU somehow matches both lists; the shipped keyword
/// sets are disjoint.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    bundle_keywords: Vec<String>,
    subcomponent_keywords: Vec<String>,
}

impl KeywordClassifier {
    /// Create a classifier from keyword lists. Keywords are matched
    /// case-insensitively as substrings of the SKU code.
    pub fn new<K: AsRef<str>>(bundle_keywords: &[K], subcomponent_keywords: &[K]) -> Self {
        Self {
            bundle_keywords: bundle_keywords.iter().map(|k| k.as_ref().to_lowercase()).collect(),
            subcomponent_keywords: subcomponent_keywords
                .iter()
                .map(|k| k.as_ref().to_lowercase())
                .collect(),
        }
    }
}

impl Default for KeywordClassifier {
    /// The keyword sets the warehouse ships with.
    fn default() -> Self {
        Self::new(
            &["+512gb", "--512gb"],
            &["+1tb", "--1tb", "b0d1d5j1j1"],
        )
    }
}

impl SkuClassifier for KeywordClassifier {
    fn classify(&self, sku: &str) -> SkuClass {
        let sku = sku.to_lowercase();
        if self.bundle_keywords.iter().any(|k| sku.contains(k)) {
            SkuClass::Bundled
        } else if self.subcomponent_keywords.iter().any(|k| sku.contains(k)) {
            SkuClass::Subcomponent
        } else {
            SkuClass::Plain
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_plain() {
        let classifier = KeywordClassifier::default();
        assert_eq!(classifier.classify("LAPTOP-15"), SkuClass::Plain);
        assert_eq!(classifier.classify(""), SkuClass::Plain);
    }

    #[test]
    fn test_classify_bundled_case_insensitive() {
        let classifier = KeywordClassifier::default();
        assert_eq!(classifier.classify("LAPTOP-15+512GB"), SkuClass::Bundled);
        assert_eq!(classifier.classify("laptop-15--512gb"), SkuClass::Bundled);
    }

    #[test]
    fn test_classify_subcomponent() {
        let classifier = KeywordClassifier::default();
        assert_eq!(classifier.classify("LAPTOP-15+1TB"), SkuClass::Subcomponent);
        assert_eq!(classifier.classify("B0D1D5J1J1"), SkuClass::Subcomponent);
    }

    #[test]
    fn test_bundled_wins_on_overlap() {
        let classifier = KeywordClassifier::new(&["combo"], &["combo"]);
        assert_eq!(classifier.classify("SKU-COMBO"), SkuClass::Bundled);
    }

    #[test]
    fn test_custom_keywords() {
        let classifier = KeywordClassifier::new(&["+dual"], &["+mod"]);
        assert_eq!(classifier.classify("X+DUAL"), SkuClass::Bundled);
        assert_eq!(classifier.classify("X+MOD"), SkuClass::Subcomponent);
        assert_eq!(classifier.classify("X+512GB"), SkuClass::Plain);
    }
}
