//! Tally Domain Layer
//!
//! Entities and validated value types for serialized-inventory tracking.
//! No I/O lives here: storage, HTTP, and scheduling are other crates'
//! concerns.

#![warn(clippy::all)]

pub mod entities;
pub mod orders;
pub mod value_objects;

pub use entities::{
    InventoryUnit, LogEntry, ManualReviewItem, NewReviewItem, PoolId, Product,
    ProductAvailability, ProductId, ReturnRecord, SoftAllocation, UnitId, UserId,
};
pub use orders::{OrderLine, ShippedOrder};
pub use value_objects::{
    validate_po_number, validate_sn_prefix, DomainError, Serial, RETURN_PO_MARKER,
    SENTINEL_SERIAL,
};
