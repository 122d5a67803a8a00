//! HTTP route handlers.

pub mod cart;
pub mod categories;
pub mod checkout;
pub mod health;
pub mod menu;
pub mod metrics;
pub mod notifications;
pub mod orders;
pub mod products;
pub mod session;
pub mod settings;
pub mod upload;
