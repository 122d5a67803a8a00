//! Cart engine.
//!
//! The cart total is never stored independently of its items: every
//! structural change recomputes it in the same step, and deserialized carts
//! have their total re-derived.

use common::ProductId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::Product;
use crate::value_objects::Money;

/// Errors from cart commands.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    /// No product with this id is on the menu.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The product is flagged unavailable.
    #[error("{0} is currently unavailable")]
    ProductUnavailable(String),

    /// Items must be added with a positive quantity.
    #[error("Quantity must be at least 1")]
    InvalidQuantity,

    /// The product is not in the cart.
    #[error("Product {0} is not in the cart")]
    ItemNotInCart(ProductId),
}

/// A cart line: a product snapshot taken when it was added, and a quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: ProductId,
    pub product: Product,
    pub quantity: u32,
}

impl CartItem {
    pub fn line_total(&self) -> Money {
        self.product.price.multiply(self.quantity)
    }
}

#[derive(Deserialize)]
struct CartData {
    #[serde(default)]
    items: Vec<CartItem>,
}

impl From<CartData> for Cart {
    fn from(data: CartData) -> Self {
        Cart::from_items(data.items)
    }
}

/// The customer's cart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "CartData")]
pub struct Cart {
    items: Vec<CartItem>,
    total: Money,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a cart from line items, dropping non-positive quantities.
    pub fn from_items(items: Vec<CartItem>) -> Self {
        let mut cart = Self {
            items: items.into_iter().filter(|i| i.quantity > 0).collect(),
            total: Money::zero(),
        };
        cart.recompute();
        cart
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn total(&self) -> Money {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total number of units across all lines.
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    pub fn get(&self, product_id: &ProductId) -> Option<&CartItem> {
        self.items.iter().find(|i| &i.product_id == product_id)
    }

    pub fn contains(&self, product_id: &ProductId) -> bool {
        self.get(product_id).is_some()
    }

    /// Adds `quantity` units of `product`.
    ///
    /// An existing line keeps its original product snapshot and has its
    /// quantity increased.
    pub fn add(&mut self, product: Product, quantity: u32) {
        if quantity == 0 {
            return;
        }
        match self.items.iter_mut().find(|i| i.product_id == product.id) {
            Some(item) => item.quantity = item.quantity.saturating_add(quantity),
            None => self.items.push(CartItem {
                product_id: product.id.clone(),
                product,
                quantity,
            }),
        }
        self.recompute();
    }

    /// Sets a line's quantity; zero or less removes the line.
    pub fn set_quantity(&mut self, product_id: &ProductId, quantity: i64) {
        if quantity <= 0 {
            self.items.retain(|i| &i.product_id != product_id);
        } else if let Some(item) = self.items.iter_mut().find(|i| &i.product_id == product_id) {
            item.quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
        }
        self.recompute();
    }

    pub fn remove(&mut self, product_id: &ProductId) {
        self.items.retain(|i| &i.product_id != product_id);
        self.recompute();
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.recompute();
    }

    fn recompute(&mut self) {
        self.total = self.items.iter().map(CartItem::line_total).sum();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::catalog::default_products;

    fn products() -> Vec<Product> {
        default_products(Utc::now())
    }

    fn assert_total_consistent(cart: &Cart) {
        let expected: i64 = cart
            .items()
            .iter()
            .map(|i| i.product.price.cents() * i.quantity as i64)
            .sum();
        assert_eq!(cart.total().cents(), expected);
    }

    #[test]
    fn add_merges_existing_lines() {
        let products = products();
        let mut cart = Cart::new();

        cart.add(products[0].clone(), 1);
        cart.add(products[2].clone(), 2);
        cart.add(products[0].clone(), 2);

        assert_eq!(cart.items().len(), 2);
        assert_eq!(cart.get(&products[0].id).unwrap().quantity, 3);
        assert_eq!(cart.item_count(), 5);
        // 3 * 12.99 + 2 * 4.99
        assert_eq!(cart.total(), Money::from_cents(4895));
        assert_total_consistent(&cart);
    }

    #[test]
    fn set_quantity_non_positive_removes() {
        let products = products();
        let mut cart = Cart::new();
        cart.add(products[0].clone(), 2);
        cart.add(products[1].clone(), 1);

        cart.set_quantity(&products[0].id, 0);
        assert!(!cart.contains(&products[0].id));

        cart.set_quantity(&products[1].id, -1);
        assert!(cart.is_empty());
        assert_eq!(cart.total(), Money::zero());
    }

    #[test]
    fn set_quantity_updates_total() {
        let products = products();
        let mut cart = Cart::new();
        cart.add(products[4].clone(), 1);

        cart.set_quantity(&products[4].id, 4);
        assert_eq!(cart.total(), Money::from_cents(1196));
        assert_total_consistent(&cart);
    }

    #[test]
    fn remove_and_clear() {
        let products = products();
        let mut cart = Cart::new();
        cart.add(products[0].clone(), 5);
        cart.add(products[3].clone(), 1);

        cart.remove(&products[0].id);
        assert_eq!(cart.total(), Money::from_cents(699));

        cart.clear();
        assert!(cart.is_empty());
        assert_eq!(cart.total(), Money::zero());
    }

    #[test]
    fn snapshot_is_not_refreshed_by_later_price_changes() {
        let mut products = products();
        let mut cart = Cart::new();
        cart.add(products[0].clone(), 1);

        products[0].price = Money::from_cents(1999);
        cart.add(products[0].clone(), 1);

        // The line keeps the price captured when it was first added
        assert_eq!(cart.total(), Money::from_cents(2598));
    }

    #[test]
    fn random_mutation_sequences_keep_total_consistent() {
        let products = products();
        let mut cart = Cart::new();

        for step in 0..200u32 {
            let product = &products[(step as usize * 7) % products.len()];
            match step % 4 {
                0 => cart.add(product.clone(), step % 3 + 1),
                1 => cart.set_quantity(&product.id, (step % 5) as i64 - 1),
                2 => cart.remove(&product.id),
                _ => cart.add(product.clone(), 1),
            }
            assert_total_consistent(&cart);
            assert!(cart.items().iter().all(|i| i.quantity > 0));
        }
    }

    #[test]
    fn deserialization_recomputes_total() {
        let products = products();
        let mut cart = Cart::new();
        cart.add(products[2].clone(), 2);

        let mut json = serde_json::to_value(&cart).unwrap();
        json["total"] = serde_json::json!(1);

        let restored: Cart = serde_json::from_value(json).unwrap();
        assert_eq!(restored.total(), Money::from_cents(998));
    }
}
