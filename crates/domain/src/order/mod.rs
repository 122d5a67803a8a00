//! Order workflow: orders, their status lifecycle, and history queries.

mod filter;
mod model;
mod state;

pub use filter::OrderFilters;
pub use model::{Order, OrderItem};
pub use state::OrderStatus;

use common::OrderId;
use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// The table number was empty or whitespace.
    #[error("Table number is required")]
    TableNumberRequired,

    /// The table number is not 1 to 10 alphanumeric characters.
    #[error("Invalid table number: {0} (use 1-10 letters or digits)")]
    InvalidTableNumber(String),

    /// Checkout was attempted with nothing in the cart.
    #[error("Cannot place an order with an empty cart")]
    EmptyCart,

    /// No order with this id exists.
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// The requested status change is not allowed from the current status.
    #[error("Invalid status transition: cannot move order from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },
}
