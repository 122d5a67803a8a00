//! Shared types for the restaurant ordering system.

pub mod types;

pub use types::{CategoryId, OrderId, ProductId};
