//! Tally Testkit
//!
//! Shared builders and store-seeding helpers for integration tests.

#![warn(clippy::all)]

mod builders;
mod seed;

pub use builders::OrderBuilder;
pub use seed::{seed_product, seed_tagged_unit, seed_unit, SeedUnit};
