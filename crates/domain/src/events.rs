//! Store events: every state change is expressed as one of these.

use chrono::{DateTime, Utc};
use common::{CategoryId, OrderId, ProductId};
use persistence::AdminProfile;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::catalog::{Category, Product, ProductPatch};
use crate::order::{Order, OrderStatus};
use crate::settings::SettingsPatch;

/// Events applied to the restaurant state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum StoreEvent {
    /// A product was added to the menu.
    ProductAdded(Product),

    /// A product was partially updated.
    ProductUpdated {
        id: ProductId,
        patch: ProductPatch,
        at: DateTime<Utc>,
    },

    /// A product was removed from the menu.
    ProductDeleted { id: ProductId },

    /// A category was added.
    CategoryAdded(Category),

    /// A category was removed.
    CategoryDeleted { id: CategoryId },

    /// Units of a product were added to the cart (snapshot included).
    CartItemAdded { product: Product, quantity: u32 },

    /// A cart line's quantity was set; non-positive removes the line.
    CartItemQuantitySet { product_id: ProductId, quantity: i64 },

    /// A cart line was removed.
    CartItemRemoved { product_id: ProductId },

    /// The cart was emptied.
    CartCleared,

    /// An order was placed.
    OrderPlaced(Order),

    /// The next order number moved on.
    OrderNumberAdvanced { next: u64 },

    /// An order's status changed.
    OrderStatusChanged {
        order_id: OrderId,
        status: OrderStatus,
        at: DateTime<Utc>,
    },

    /// Order history was wiped and numbering restarted.
    OrderHistoryCleared,

    /// Settings were shallow-merged.
    SettingsUpdated(SettingsPatch),

    /// The cached admin profile changed.
    AdminProfileCached(Option<AdminProfile>),

    /// The cached authentication flag changed.
    AuthenticationChanged { authenticated: bool },
}

impl DomainEvent for StoreEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StoreEvent::ProductAdded(_) => "ProductAdded",
            StoreEvent::ProductUpdated { .. } => "ProductUpdated",
            StoreEvent::ProductDeleted { .. } => "ProductDeleted",
            StoreEvent::CategoryAdded(_) => "CategoryAdded",
            StoreEvent::CategoryDeleted { .. } => "CategoryDeleted",
            StoreEvent::CartItemAdded { .. } => "CartItemAdded",
            StoreEvent::CartItemQuantitySet { .. } => "CartItemQuantitySet",
            StoreEvent::CartItemRemoved { .. } => "CartItemRemoved",
            StoreEvent::CartCleared => "CartCleared",
            StoreEvent::OrderPlaced(_) => "OrderPlaced",
            StoreEvent::OrderNumberAdvanced { .. } => "OrderNumberAdvanced",
            StoreEvent::OrderStatusChanged { .. } => "OrderStatusChanged",
            StoreEvent::OrderHistoryCleared => "OrderHistoryCleared",
            StoreEvent::SettingsUpdated(_) => "SettingsUpdated",
            StoreEvent::AdminProfileCached(_) => "AdminProfileCached",
            StoreEvent::AuthenticationChanged { .. } => "AuthenticationChanged",
        }
    }
}

impl StoreEvent {
    /// Returns true for events that change cart contents.
    pub fn is_cart_mutation(&self) -> bool {
        matches!(
            self,
            StoreEvent::CartItemAdded { .. }
                | StoreEvent::CartItemQuantitySet { .. }
                | StoreEvent::CartItemRemoved { .. }
                | StoreEvent::CartCleared
        )
    }
}
