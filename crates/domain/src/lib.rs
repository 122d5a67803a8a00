//! Domain layer for the restaurant ordering system.
//!
//! This crate provides:
//! - The menu catalog (products and categories) with form validation
//! - The cart engine, whose total is always derived from its line items
//! - The order workflow with sequential numbering and a status state machine
//! - Reducer-style [`StoreEvent`]s applied to [`RestaurantState`]
//! - A versioned, migratable [`PersistedSnapshot`]
//! - [`RestaurantStore`], the service that owns the state and keeps it persisted

pub mod admin;
pub mod aggregate;
pub mod cart;
pub mod catalog;
pub mod error;
pub mod events;
pub mod order;
pub mod settings;
pub mod snapshot;
pub mod state;
pub mod store;
pub mod value_objects;

pub use admin::{AdminCache, AdminError, AdminSetupForm, LoginRateLimiter};
pub use aggregate::{Aggregate, DomainEvent};
pub use cart::{Cart, CartError, CartItem};
pub use catalog::{CatalogError, Category, ImageSource, Product, ProductForm, ProductPatch};
pub use common::{CategoryId, OrderId, ProductId};
pub use error::{DomainError, Result};
pub use events::StoreEvent;
pub use order::{Order, OrderError, OrderFilters, OrderItem, OrderStatus};
pub use settings::{PriceBreakdown, RestaurantSettings, SettingsError, SettingsPatch};
pub use snapshot::{PersistedSnapshot, SNAPSHOT_VERSION, SnapshotError};
pub use state::RestaurantState;
pub use store::{CommandResult, RestaurantStore, RestaurantStoreBuilder, SyncError, SyncHandle};
pub use value_objects::{Money, Rate, TableNumber};
