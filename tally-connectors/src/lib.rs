//! Tally Connectors
//!
//! Clients for external collaborators. Currently one: the order-management
//! REST API the reconciliation cycle pulls shipped orders from.

#![warn(clippy::all)]

pub mod orders_api;

pub use orders_api::{OrdersApiError, OrdersClient, WireOrder};
