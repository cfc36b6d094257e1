//! Value Objects for the Tally Domain
//!
//! Validated domain primitives. Invariants are enforced at construction
//! time so the rest of the system can rely on them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder serial meaning "physical unit received but not yet
/// serial-tagged". Any number of units may carry it at once.
pub const SENTINEL_SERIAL: &str = "NOSER";

/// PO marker written onto a unit when it re-enters stock through a return.
pub const RETURN_PO_MARKER: &str = "RETURN";

/// Domain errors for value object validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Serial must be non-empty after trimming
    #[error("Invalid serial: {0}")]
    InvalidSerial(String),

    /// PO number failed intake validation
    #[error("Invalid PO number: {0}")]
    InvalidPoNumber(String),

    /// SN prefix failed intake validation
    #[error("Invalid SN prefix: {0}")]
    InvalidSnPrefix(String),

    /// Quantity must be positive
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),
}

// =============================================================================
// Serial
// =============================================================================

/// A serial number scanned off a physical unit.
///
/// # Invariants
/// - Non-empty after trimming surrounding whitespace
///
/// The sentinel value [`SENTINEL_SERIAL`] is a valid `Serial` (stored units
/// carry it before tagging); callers that require a real serial check
/// [`Serial::is_sentinel`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Serial(String);

impl Serial {
    /// Create a new Serial, trimming surrounding whitespace.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidSerial` if the trimmed value is empty.
    pub fn new(value: impl AsRef<str>) -> Result<Self, DomainError> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(DomainError::InvalidSerial("serial must be non-empty".to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The sentinel serial carried by untagged units.
    pub fn sentinel() -> Self {
        Self(SENTINEL_SERIAL.to_string())
    }

    /// Whether this is the untagged-unit sentinel.
    pub fn is_sentinel(&self) -> bool {
        self.0 == SENTINEL_SERIAL
    }

    /// Get the serial as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Intake validation
// =============================================================================

/// Validate a PO number at delivery intake.
///
/// Rejects values shorter than 3 characters and values shaped like an order
/// id (an `11-` prefix or two or more dashes), which operators routinely
/// scan into the wrong field.
pub fn validate_po_number(po_number: &str) -> Result<(), DomainError> {
    if po_number.len() < 3 {
        return Err(DomainError::InvalidPoNumber("PO number is required".to_string()));
    }
    if po_number.starts_with("11-") || po_number.matches('-').count() >= 2 {
        return Err(DomainError::InvalidPoNumber(
            "that looks like an order id, not a PO number".to_string(),
        ));
    }
    Ok(())
}

/// Validate an SN prefix constraint at delivery intake.
///
/// Prefixes are exactly two alphanumeric characters (e.g. "5C").
pub fn validate_sn_prefix(sn_prefix: &str) -> Result<(), DomainError> {
    if sn_prefix.len() != 2 || !sn_prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(DomainError::InvalidSnPrefix(
            "SN prefix must be 2 alphanumeric characters".to_string(),
        ));
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
