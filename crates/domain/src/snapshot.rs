//! Versioned persisted snapshot of the restaurant state.
//!
//! The current schema is [`SNAPSHOT_VERSION`]. Snapshots written before
//! versioning (no `version` field, floating point prices, an `adminUser`
//! holding a plain password) are migrated on load.

use chrono::{DateTime, Utc};
use common::{CategoryId, OrderId, ProductId};
use persistence::AdminProfile;
use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::admin::AdminCache;
use crate::cart::{Cart, CartItem};
use crate::catalog::{Category, Product};
use crate::order::{Order, OrderItem, OrderStatus};
use crate::settings::RestaurantSettings;
use crate::state::RestaurantState;
use crate::value_objects::{Money, TableNumber};

/// Schema version written by [`encode`].
pub const SNAPSHOT_VERSION: u64 = 1;

/// Errors decoding a persisted snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The text is not JSON or does not match the schema.
    #[error("Malformed snapshot: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The snapshot was written by a newer or unknown schema.
    #[error("Unsupported snapshot version: {0}")]
    UnsupportedVersion(String),

    /// A legacy amount could not be represented in cents.
    #[error("Invalid amount in {field}: {value}")]
    InvalidAmount { field: &'static str, value: f64 },
}

/// The serialized form of [`RestaurantState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSnapshot {
    pub version: u64,
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub orders: Vec<Order>,
    #[serde(default)]
    pub cart: Cart,
    #[serde(default)]
    pub settings: RestaurantSettings,
    #[serde(default)]
    pub admin_user: Option<AdminProfile>,
    #[serde(default = "first_order_number")]
    pub next_order_number: u64,
}

fn first_order_number() -> u64 {
    1
}

impl PersistedSnapshot {
    pub fn from_state(state: &RestaurantState) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            products: state.products.clone(),
            categories: state.categories.clone(),
            orders: state.orders.clone(),
            cart: state.cart.clone(),
            settings: state.settings.clone(),
            admin_user: state.admin.profile.clone(),
            next_order_number: state.next_order_number,
        }
    }

    /// Rebuilds the state. Authentication always starts signed out, and
    /// the next order number is raised past any stored order.
    pub fn into_state(self) -> RestaurantState {
        let highest = self.orders.iter().map(|o| o.order_number).max().unwrap_or(0);
        let next_order_number = self.next_order_number.max(highest + 1).max(1);

        RestaurantState {
            products: self.products,
            categories: self.categories,
            cart: Cart::from_items(self.cart.items().to_vec()),
            orders: self.orders,
            settings: self.settings,
            admin: AdminCache {
                profile: self.admin_user,
                authenticated: false,
            },
            next_order_number,
        }
    }
}

/// Serializes `state` at the current schema version.
pub fn encode(state: &RestaurantState) -> Result<String, SnapshotError> {
    Ok(serde_json::to_string(&PersistedSnapshot::from_state(state))?)
}

/// Parses a snapshot of any supported version into a state.
pub fn decode(input: &str) -> Result<RestaurantState, SnapshotError> {
    let value: Value = serde_json::from_str(input)?;
    if !value.is_object() {
        return Err(serde_json::Error::custom("snapshot must be a JSON object").into());
    }

    let snapshot = match value.get("version") {
        None => serde_json::from_value::<LegacySnapshot>(value)?.migrate()?,
        Some(version) if version.as_u64() == Some(SNAPSHOT_VERSION) => {
            serde_json::from_value::<PersistedSnapshot>(value)?
        }
        Some(version) => return Err(SnapshotError::UnsupportedVersion(version.to_string())),
    };

    Ok(snapshot.into_state())
}

// Unversioned browser snapshot

/// Keys absent from the stored object keep their default state.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacySnapshot {
    #[serde(default)]
    products: Option<Vec<LegacyProduct>>,
    #[serde(default)]
    categories: Option<Vec<LegacyCategory>>,
    #[serde(default)]
    orders: Option<Vec<LegacyOrder>>,
    #[serde(default)]
    cart: Option<LegacyCart>,
    #[serde(default)]
    settings: Option<RestaurantSettings>,
    #[serde(default)]
    admin_user: Option<LegacyAdminUser>,
    #[serde(default)]
    next_order_number: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyProduct {
    id: ProductId,
    name: String,
    #[serde(default)]
    description: String,
    price: f64,
    #[serde(default)]
    category: String,
    #[serde(default)]
    image: Option<String>,
    #[serde(default = "available_by_default")]
    available: bool,
    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    updated_at: DateTime<Utc>,
}

fn available_by_default() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyCategory {
    id: CategoryId,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyOrderItem {
    product_id: ProductId,
    product: LegacyProduct,
    quantity: u32,
    #[serde(default)]
    price: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyOrder {
    id: OrderId,
    order_number: u64,
    #[serde(default)]
    items: Vec<LegacyOrderItem>,
    table_number: TableNumber,
    #[serde(default)]
    status: OrderStatus,
    total: f64,
    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyCartItem {
    product_id: ProductId,
    product: LegacyProduct,
    quantity: u32,
}

/// The stored total is ignored; it is re-derived from the items.
#[derive(Debug, Default, Deserialize)]
struct LegacyCart {
    #[serde(default)]
    items: Vec<LegacyCartItem>,
}

/// Older snapshots kept `{username, password}` here. The password is
/// dropped; a profile is only kept when an email is present.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyAdminUser {
    #[serde(default)]
    uid: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

fn legacy_money(value: f64, field: &'static str) -> Result<Money, SnapshotError> {
    Money::from_f64(value).ok_or(SnapshotError::InvalidAmount { field, value })
}

impl LegacyProduct {
    fn migrate(self) -> Result<Product, SnapshotError> {
        Ok(Product {
            id: self.id,
            name: self.name,
            description: self.description,
            price: legacy_money(self.price, "product price")?,
            category: self.category,
            image: self.image.filter(|url| !url.trim().is_empty()),
            available: self.available,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl LegacyOrder {
    fn migrate(self) -> Result<Order, SnapshotError> {
        let items = self
            .items
            .into_iter()
            .map(|item| {
                let product = item.product.migrate()?;
                let unit_price = match item.price {
                    Some(price) => legacy_money(price, "order item price")?,
                    None => product.price,
                };
                Ok(OrderItem {
                    product_id: item.product_id,
                    product,
                    quantity: item.quantity,
                    unit_price,
                })
            })
            .collect::<Result<Vec<_>, SnapshotError>>()?;

        Ok(Order {
            id: self.id,
            order_number: self.order_number,
            items,
            table_number: self.table_number,
            status: self.status,
            total: legacy_money(self.total, "order total")?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl LegacyAdminUser {
    fn migrate(self) -> Option<AdminProfile> {
        let email = self.email.filter(|e| !e.trim().is_empty())?;
        Some(AdminProfile {
            uid: self.uid.unwrap_or_else(|| email.clone()),
            username: self.username.unwrap_or_else(|| "admin".to_string()),
            email,
            created_at: self.created_at.unwrap_or_else(Utc::now),
            last_login: None,
        })
    }
}

impl LegacySnapshot {
    fn migrate(self) -> Result<PersistedSnapshot, SnapshotError> {
        let defaults = PersistedSnapshot::from_state(&RestaurantState::default());

        let products = match self.products {
            Some(products) => products
                .into_iter()
                .map(LegacyProduct::migrate)
                .collect::<Result<Vec<_>, _>>()?,
            None => defaults.products,
        };

        let categories = match self.categories {
            Some(categories) => categories
                .into_iter()
                .map(|c| Category {
                    id: c.id,
                    name: c.name,
                    description: c.description.filter(|d| !d.trim().is_empty()),
                    created_at: c.created_at,
                })
                .collect(),
            None => defaults.categories,
        };

        let orders = self
            .orders
            .unwrap_or_default()
            .into_iter()
            .map(LegacyOrder::migrate)
            .collect::<Result<Vec<_>, _>>()?;

        let cart_items = self
            .cart
            .unwrap_or_default()
            .items
            .into_iter()
            .filter(|item| item.quantity > 0)
            .map(|item| {
                Ok(CartItem {
                    product_id: item.product_id,
                    product: item.product.migrate()?,
                    quantity: item.quantity,
                })
            })
            .collect::<Result<Vec<_>, SnapshotError>>()?;

        Ok(PersistedSnapshot {
            version: SNAPSHOT_VERSION,
            products,
            categories,
            orders,
            cart: Cart::from_items(cart_items),
            settings: self.settings.unwrap_or(defaults.settings),
            admin_user: self.admin_user.and_then(LegacyAdminUser::migrate),
            next_order_number: self
                .next_order_number
                .unwrap_or(defaults.next_order_number),
        })
    }
}
