//! Daemon error types.

use tally_connectors::OrdersApiError;
use tally_domain::DomainError;
use tally_engine::EngineError;
use tally_store::StoreError;
use thiserror::Error;

/// Daemon-level errors.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Domain error
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Engine error
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Order API error
    #[error("Order API error: {0}")]
    OrdersApi(#[from] OrdersApiError),

    /// Serial not found in the unit store
    #[error("Serial number not found: {0}")]
    SerialNotFound(String),

    /// Serial already assigned to another unit
    #[error("Serial number already exists: {0}")]
    SerialAlreadyExists(String),

    /// Serial is not marked sold (e.g. a return scan for an in-stock unit)
    #[error("Serial number is already in stock: {0}")]
    SerialNotSold(String),

    /// Unit not found
    #[error("Unit not found: {0}")]
    UnitNotFound(i64),

    /// Unit already carries a real serial
    #[error("Unit {0} already has a serial assigned")]
    AlreadySerialized(i64),

    /// Unit has been disposed (terminal)
    #[error("Unit {0} is disposed")]
    UnitDisposed(i64),

    /// Serial does not match the unit's required prefix
    #[error("Serial must start with '{expected}'")]
    SnPrefixMismatch { expected: String },

    /// Return placeholder missing or not a sentinel unit
    #[error("Placeholder unit not found: {0}")]
    PlaceholderNotFound(i64),

    /// Scanned unit and placeholder belong to different product families
    #[error("Master SKU mismatch between scanned unit and placeholder")]
    MasterSkuMismatch,

    /// Review row missing or already resolved
    #[error("Review not found or already resolved: order {order_id}, sku {sku}")]
    ReviewNotFound { order_id: String, sku: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;
