//! The restaurant state and its validating command methods.

use chrono::{DateTime, Utc};
use common::{CategoryId, OrderId, ProductId};
use persistence::AdminProfile;

use crate::admin::AdminCache;
use crate::aggregate::Aggregate;
use crate::cart::{Cart, CartError};
use crate::catalog::{
    CatalogError, Category, Product, ProductForm, ProductPatch, default_categories,
    default_products,
};
use crate::events::StoreEvent;
use crate::order::{Order, OrderError, OrderFilters, OrderItem, OrderStatus};
use crate::settings::{PriceBreakdown, RestaurantSettings, SettingsError, SettingsPatch};
use crate::value_objects::TableNumber;

/// Everything the domain store holds.
///
/// Commands take `&self`, validate, and return the events to apply; they
/// never mutate. [`Aggregate::apply`] is the only way the state changes.
#[derive(Debug, Clone, PartialEq)]
pub struct RestaurantState {
    pub(crate) products: Vec<Product>,
    pub(crate) categories: Vec<Category>,
    pub(crate) cart: Cart,
    pub(crate) orders: Vec<Order>,
    pub(crate) settings: RestaurantSettings,
    pub(crate) admin: AdminCache,
    pub(crate) next_order_number: u64,
}

impl Default for RestaurantState {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            products: default_products(now),
            categories: default_categories(now),
            cart: Cart::new(),
            orders: Vec::new(),
            settings: RestaurantSettings::default(),
            admin: AdminCache::default(),
            next_order_number: 1,
        }
    }
}

impl Aggregate for RestaurantState {
    type Event = StoreEvent;

    fn apply(&mut self, event: StoreEvent) {
        match event {
            StoreEvent::ProductAdded(product) => self.products.push(product),
            StoreEvent::ProductUpdated { id, patch, at } => {
                if let Some(product) = self.products.iter_mut().find(|p| p.id == id) {
                    product.apply_patch(&patch, at);
                }
            }
            StoreEvent::ProductDeleted { id } => self.products.retain(|p| p.id != id),
            StoreEvent::CategoryAdded(category) => self.categories.push(category),
            StoreEvent::CategoryDeleted { id } => self.categories.retain(|c| c.id != id),
            StoreEvent::CartItemAdded { product, quantity } => self.cart.add(product, quantity),
            StoreEvent::CartItemQuantitySet {
                product_id,
                quantity,
            } => self.cart.set_quantity(&product_id, quantity),
            StoreEvent::CartItemRemoved { product_id } => self.cart.remove(&product_id),
            StoreEvent::CartCleared => self.cart.clear(),
            StoreEvent::OrderPlaced(order) => self.orders.push(order),
            StoreEvent::OrderNumberAdvanced { next } => self.next_order_number = next,
            StoreEvent::OrderStatusChanged {
                order_id,
                status,
                at,
            } => {
                if let Some(order) = self.orders.iter_mut().find(|o| o.id == order_id) {
                    order.status = status;
                    order.updated_at = at;
                }
            }
            StoreEvent::OrderHistoryCleared => {
                self.orders.clear();
                self.next_order_number = 1;
            }
            StoreEvent::SettingsUpdated(patch) => self.settings.merge(&patch),
            StoreEvent::AdminProfileCached(profile) => self.admin.profile = profile,
            StoreEvent::AuthenticationChanged { authenticated } => {
                self.admin.authenticated = authenticated
            }
        }
    }
}

// Query methods
impl RestaurantState {
    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn product(&self, id: &ProductId) -> Option<&Product> {
        self.products.iter().find(|p| &p.id == id)
    }

    /// Products a customer can order.
    pub fn available_products(&self) -> impl Iterator<Item = &Product> {
        self.products.iter().filter(|p| p.available)
    }

    /// Products listed under `category` (matched case-insensitively).
    pub fn products_in_category<'a>(
        &'a self,
        category: &'a str,
    ) -> impl Iterator<Item = &'a Product> {
        self.products
            .iter()
            .filter(move |p| p.category.trim().eq_ignore_ascii_case(category.trim()))
    }

    /// Number of products referencing `category`.
    pub fn product_count(&self, category: &str) -> usize {
        self.products_in_category(category).count()
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn category(&self, id: &CategoryId) -> Option<&Category> {
        self.categories.iter().find(|c| &c.id == id)
    }

    pub fn cart(&self) -> &Cart {
        &self.cart
    }

    /// Cart subtotal with tax and service charge at the current rates.
    pub fn cart_breakdown(&self) -> PriceBreakdown {
        PriceBreakdown::compute(self.cart.total(), &self.settings)
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn order(&self, id: &OrderId) -> Option<&Order> {
        self.orders.iter().find(|o| &o.id == id)
    }

    /// Orders matching every present filter.
    pub fn filtered_orders(&self, filters: &OrderFilters) -> Vec<&Order> {
        filters.apply(&self.orders)
    }

    pub fn settings(&self) -> &RestaurantSettings {
        &self.settings
    }

    pub fn admin(&self) -> &AdminCache {
        &self.admin
    }

    pub fn next_order_number(&self) -> u64 {
        self.next_order_number
    }
}

// Command methods (return events)
impl RestaurantState {
    /// Adds a product built from a validated form.
    pub fn add_product(
        &self,
        id: ProductId,
        form: &ProductForm,
        image: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Vec<StoreEvent>, CatalogError> {
        let price = form.validate()?;

        Ok(vec![StoreEvent::ProductAdded(Product {
            id,
            name: form.name.trim().to_string(),
            description: form.description.trim().to_string(),
            price,
            category: form.category.trim().to_string(),
            image,
            available: true,
            created_at: now,
            updated_at: now,
        })])
    }

    /// Updates a product. Unknown ids produce no events.
    pub fn update_product(
        &self,
        id: &ProductId,
        patch: ProductPatch,
        now: DateTime<Utc>,
    ) -> Result<Vec<StoreEvent>, CatalogError> {
        if self.product(id).is_none() {
            return Ok(vec![]);
        }
        patch.validate()?;

        Ok(vec![StoreEvent::ProductUpdated {
            id: id.clone(),
            patch,
            at: now,
        }])
    }

    /// Deletes a product. Historical orders keep their snapshots.
    pub fn delete_product(&self, id: &ProductId) -> Vec<StoreEvent> {
        match self.product(id) {
            Some(_) => vec![StoreEvent::ProductDeleted { id: id.clone() }],
            None => vec![],
        }
    }

    pub fn add_category(
        &self,
        id: CategoryId,
        name: &str,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Vec<StoreEvent>, CatalogError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CatalogError::CategoryNameRequired);
        }
        if self.categories.iter().any(|c| c.has_name(name)) {
            return Err(CatalogError::DuplicateCategory(name.to_string()));
        }

        Ok(vec![StoreEvent::CategoryAdded(Category {
            id,
            name: name.to_string(),
            description: description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            created_at: now,
        })])
    }

    /// Deletes a category unless products still reference it.
    pub fn delete_category(&self, id: &CategoryId) -> Result<Vec<StoreEvent>, CatalogError> {
        let Some(category) = self.category(id) else {
            return Ok(vec![]);
        };

        let product_count = self.product_count(&category.name);
        if product_count > 0 {
            return Err(CatalogError::CategoryInUse {
                name: category.name.clone(),
                product_count,
            });
        }

        Ok(vec![StoreEvent::CategoryDeleted { id: id.clone() }])
    }

    pub fn add_to_cart(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<Vec<StoreEvent>, CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity);
        }
        let product = self
            .product(product_id)
            .ok_or_else(|| CartError::ProductNotFound(product_id.clone()))?;
        if !product.available {
            return Err(CartError::ProductUnavailable(product.name.clone()));
        }

        Ok(vec![StoreEvent::CartItemAdded {
            product: product.clone(),
            quantity,
        }])
    }

    pub fn update_cart_item(
        &self,
        product_id: &ProductId,
        quantity: i64,
    ) -> Result<Vec<StoreEvent>, CartError> {
        if !self.cart.contains(product_id) {
            return Err(CartError::ItemNotInCart(product_id.clone()));
        }

        Ok(vec![StoreEvent::CartItemQuantitySet {
            product_id: product_id.clone(),
            quantity,
        }])
    }

    pub fn remove_from_cart(&self, product_id: &ProductId) -> Vec<StoreEvent> {
        if self.cart.contains(product_id) {
            vec![StoreEvent::CartItemRemoved {
                product_id: product_id.clone(),
            }]
        } else {
            vec![]
        }
    }

    pub fn clear_cart(&self) -> Vec<StoreEvent> {
        if self.cart.is_empty() {
            vec![]
        } else {
            vec![StoreEvent::CartCleared]
        }
    }

    /// Turns the cart into a pending order.
    ///
    /// The returned events place the order, advance the order number and
    /// clear the cart; nothing is produced if validation fails.
    pub fn create_order(
        &self,
        id: OrderId,
        table_number: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<StoreEvent>, OrderError> {
        let table_number = TableNumber::parse(table_number)?;
        if self.cart.is_empty() {
            return Err(OrderError::EmptyCart);
        }

        let order = Order {
            id,
            order_number: self.next_order_number,
            items: self.cart.items().iter().map(OrderItem::from).collect(),
            table_number,
            status: OrderStatus::Pending,
            total: self.cart.total(),
            created_at: now,
            updated_at: now,
        };

        Ok(vec![
            StoreEvent::OrderPlaced(order),
            StoreEvent::OrderNumberAdvanced {
                next: self.next_order_number + 1,
            },
            StoreEvent::CartCleared,
        ])
    }

    /// Moves a pending order to a terminal status.
    pub fn update_order_status(
        &self,
        order_id: &OrderId,
        status: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<Vec<StoreEvent>, OrderError> {
        let order = self
            .order(order_id)
            .ok_or_else(|| OrderError::NotFound(order_id.clone()))?;

        if !order.status.can_transition_to(status) {
            return Err(OrderError::InvalidStatusTransition {
                from: order.status,
                to: status,
            });
        }

        Ok(vec![StoreEvent::OrderStatusChanged {
            order_id: order_id.clone(),
            status,
            at: now,
        }])
    }

    /// Empties order history and restarts numbering at 1.
    pub fn clear_order_history(&self) -> Vec<StoreEvent> {
        vec![StoreEvent::OrderHistoryCleared]
    }

    pub fn update_settings(&self, patch: SettingsPatch) -> Result<Vec<StoreEvent>, SettingsError> {
        if patch.is_empty() {
            return Ok(vec![]);
        }
        patch.validate()?;
        Ok(vec![StoreEvent::SettingsUpdated(patch)])
    }

    /// Mirrors the identity service's profile into the cache.
    pub fn update_admin_credentials(&self, profile: Option<AdminProfile>) -> Vec<StoreEvent> {
        if self.admin.profile == profile {
            return vec![];
        }
        vec![StoreEvent::AdminProfileCached(profile)]
    }

    /// Mirrors the identity service's authentication flag into the cache.
    pub fn set_authenticated(&self, authenticated: bool) -> Vec<StoreEvent> {
        if self.admin.authenticated == authenticated {
            return vec![];
        }
        vec![StoreEvent::AuthenticationChanged { authenticated }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::Money;
    use rust_decimal::Decimal;

    fn state() -> RestaurantState {
        RestaurantState::default()
    }

    fn run<E: std::fmt::Debug>(
        state: &mut RestaurantState,
        command: impl FnOnce(&RestaurantState) -> Result<Vec<StoreEvent>, E>,
    ) -> Vec<StoreEvent> {
        let events = command(state).unwrap();
        state.apply_events(events.clone());
        events
    }

    fn place_order(state: &mut RestaurantState, table: &str) -> Order {
        let product = state.products()[0].id.clone();
        run(state, |s| s.add_to_cart(&product, 1));
        let events = run(state, |s| {
            s.create_order(OrderId::generate(), table, Utc::now())
        });
        match &events[0] {
            StoreEvent::OrderPlaced(order) => order.clone(),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn default_state_is_seeded() {
        let state = state();
        assert_eq!(state.products().len(), 5);
        assert_eq!(state.categories().len(), 5);
        assert_eq!(state.next_order_number(), 1);
        assert!(state.cart().is_empty());
        assert!(!state.admin().authenticated);
    }

    #[test]
    fn add_product_defaults_to_available() {
        let mut state = state();
        let form = ProductForm::new(" Onion Rings ", "Crispy", Decimal::new(549, 2), "Sides");
        let events = state
            .add_product(ProductId::new("p9"), &form, None, Utc::now())
            .unwrap();
        state.apply_events(events);

        let product = state.product(&ProductId::new("p9")).unwrap();
        assert_eq!(product.name, "Onion Rings");
        assert!(product.available);
        assert_eq!(product.price, Money::from_cents(549));
        assert_eq!(product.created_at, product.updated_at);
    }

    #[test]
    fn update_unknown_product_is_a_no_op() {
        let state = state();
        let events = state
            .update_product(&ProductId::new("nope"), ProductPatch::default(), Utc::now())
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn category_in_use_cannot_be_deleted() {
        let mut state = state();
        let burgers = state.categories()[1].id.clone();
        assert!(matches!(
            state.delete_category(&burgers),
            Err(CatalogError::CategoryInUse { product_count: 1, .. })
        ));

        // "All Items" has no products
        let all_items = state.categories()[0].id.clone();
        run(&mut state, |s| s.delete_category(&all_items));
        assert!(state.category(&all_items).is_none());
        assert_eq!(state.categories().len(), 4);
    }

    #[test]
    fn duplicate_category_names_are_refused() {
        let state = state();
        let result = state.add_category(CategoryId::generate(), " DRINKS ", None, Utc::now());
        assert_eq!(
            result,
            Err(CatalogError::DuplicateCategory("DRINKS".to_string()))
        );
        assert_eq!(
            state.add_category(CategoryId::generate(), "  ", None, Utc::now()),
            Err(CatalogError::CategoryNameRequired)
        );
    }

    #[test]
    fn add_to_cart_validation() {
        let mut state = state();
        let coffee = ProductId::new("5");

        assert_eq!(state.add_to_cart(&coffee, 0), Err(CartError::InvalidQuantity));
        assert_eq!(
            state.add_to_cart(&ProductId::new("99"), 1),
            Err(CartError::ProductNotFound(ProductId::new("99")))
        );

        let patch = ProductPatch {
            available: Some(false),
            ..Default::default()
        };
        run(&mut state, |s| s.update_product(&coffee, patch, Utc::now()));
        assert_eq!(
            state.add_to_cart(&coffee, 1),
            Err(CartError::ProductUnavailable("Coffee".to_string()))
        );
    }

    #[test]
    fn create_order_on_empty_cart_changes_nothing() {
        let state = state();
        let before = state.clone();
        assert_eq!(
            state.create_order(OrderId::generate(), "5", Utc::now()),
            Err(OrderError::EmptyCart)
        );
        assert_eq!(state, before);
    }

    #[test]
    fn create_order_requires_table_number() {
        let mut state = state();
        run(&mut state, |s| s.add_to_cart(&ProductId::new("1"), 1));
        assert_eq!(
            state.create_order(OrderId::generate(), "   ", Utc::now()),
            Err(OrderError::TableNumberRequired)
        );
        assert_eq!(state.next_order_number(), 1);
        assert!(!state.cart().is_empty());
    }

    #[test]
    fn orders_are_numbered_sequentially_and_clear_the_cart() {
        let mut state = state();
        run(&mut state, |s| s.add_to_cart(&ProductId::new("1"), 2));
        run(&mut state, |s| s.add_to_cart(&ProductId::new("5"), 1));

        let first = place_order(&mut state, "5");
        assert_eq!(first.order_number, 1);
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.total, Money::from_cents(2 * 1299 + 299 + 1299));
        assert_eq!(first.status, OrderStatus::Pending);
        assert!(state.cart().is_empty());

        let second = place_order(&mut state, "A7");
        assert_eq!(second.order_number, 2);
        assert_eq!(state.next_order_number(), 3);
    }

    #[test]
    fn order_items_keep_prices_after_product_changes() {
        let mut state = state();
        let order = place_order(&mut state, "3");
        let patch = ProductPatch {
            price: Some(Money::from_cents(1)),
            ..Default::default()
        };
        run(&mut state, |s| {
            s.update_product(&ProductId::new("1"), patch, Utc::now())
        });

        let stored = state.order(&order.id).unwrap();
        assert_eq!(stored.items[0].unit_price, Money::from_cents(1299));
    }

    #[test]
    fn terminal_orders_reject_further_transitions() {
        let mut state = state();
        let order = place_order(&mut state, "5");

        run(&mut state, |s| {
            s.update_order_status(&order.id, OrderStatus::Completed, Utc::now())
        });
        let completed = state.order(&order.id).unwrap().clone();

        let result = state.update_order_status(&order.id, OrderStatus::Cancelled, Utc::now());
        assert_eq!(
            result,
            Err(OrderError::InvalidStatusTransition {
                from: OrderStatus::Completed,
                to: OrderStatus::Cancelled,
            })
        );
        let after = state.order(&order.id).unwrap();
        assert_eq!(after, &completed);
        assert_eq!(after.total, order.total);
        assert_eq!(after.items, order.items);
    }

    #[test]
    fn status_change_stamps_updated_at() {
        let mut state = state();
        let order = place_order(&mut state, "5");
        let later = order.created_at + chrono::Duration::minutes(10);

        run(&mut state, |s| {
            s.update_order_status(&order.id, OrderStatus::Cancelled, later)
        });
        let stored = state.order(&order.id).unwrap();
        assert_eq!(stored.status, OrderStatus::Cancelled);
        assert_eq!(stored.updated_at, later);
        assert_eq!(stored.created_at, order.created_at);
    }

    #[test]
    fn unknown_order_status_update_fails() {
        let state = state();
        let missing = OrderId::new("missing");
        assert_eq!(
            state.update_order_status(&missing, OrderStatus::Completed, Utc::now()),
            Err(OrderError::NotFound(missing))
        );
    }

    #[test]
    fn clear_history_resets_numbering() {
        let mut state = state();
        for table in ["1", "2", "3"] {
            place_order(&mut state, table);
        }
        assert_eq!(state.next_order_number(), 4);

        let events = state.clear_order_history();
        state.apply_events(events);
        assert!(state.orders().is_empty());
        assert_eq!(state.next_order_number(), 1);

        // Also when history is already empty
        let events = state.clear_order_history();
        state.apply_events(events);
        assert_eq!(state.next_order_number(), 1);
    }

    #[test]
    fn settings_changes_reprice_immediately() {
        let mut state = state();
        run(&mut state, |s| s.add_to_cart(&ProductId::new("1"), 1));
        let before = state.cart_breakdown();

        let patch = SettingsPatch {
            tax_rate: Some(crate::value_objects::Rate::zero()),
            ..Default::default()
        };
        run(&mut state, |s| s.update_settings(patch));

        let after = state.cart_breakdown();
        assert_eq!(before.subtotal, after.subtotal);
        assert_eq!(after.tax, Money::zero());
        assert!(after.total < before.total);
    }

    #[test]
    fn admin_cache_events_are_idempotent() {
        let mut state = state();
        assert!(state.set_authenticated(false).is_empty());

        let events = state.set_authenticated(true);
        state.apply_events(events);
        assert!(state.admin().authenticated);
        assert!(state.update_admin_credentials(None).is_empty());
    }
}
