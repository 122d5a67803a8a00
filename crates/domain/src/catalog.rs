//! Menu catalog: products and categories.

use chrono::{DateTime, Utc};
use common::{CategoryId, ProductId};
use persistence::{BearerToken, ImageFile};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value_objects::Money;

pub const PRODUCT_NAME_MIN_LEN: usize = 2;
pub const PRODUCT_NAME_MAX_LEN: usize = 100;
pub const PRODUCT_DESCRIPTION_MAX_LEN: usize = 500;

/// Errors from catalog commands.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// Product name is missing or has the wrong length.
    #[error("Product name must be between {min} and {max} characters")]
    InvalidProductName { min: usize, max: usize },

    /// Product description is too long.
    #[error("Description must be at most {max} characters")]
    DescriptionTooLong { max: usize },

    /// Price is negative or not representable.
    #[error("Price must be a non-negative amount")]
    InvalidPrice,

    /// No category was chosen for the product.
    #[error("Category is required")]
    CategoryRequired,

    /// A category was submitted with a blank name.
    #[error("Category name is required")]
    CategoryNameRequired,

    /// A category with the same name already exists.
    #[error("Category already exists: {0}")]
    DuplicateCategory(String),

    /// The category is still referenced by products.
    #[error("Cannot delete category {name}: {product_count} product(s) still use it")]
    CategoryInUse { name: String, product_count: usize },
}

/// A menu product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Money,
    /// Name of the category this product is listed under.
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Applies a partial update and stamps `updated_at`.
    pub fn apply_patch(&mut self, patch: &ProductPatch, at: DateTime<Utc>) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(price) = patch.price {
            self.price = price;
        }
        if let Some(category) = &patch.category {
            self.category = category.clone();
        }
        if let Some(image) = &patch.image {
            self.image = Some(image.clone());
        }
        if let Some(available) = patch.available {
            self.available = available;
        }
        self.updated_at = at;
    }
}

/// Where a new product's image comes from.
#[derive(Debug)]
pub enum ImageSource {
    /// An already hosted image.
    Url(String),
    /// A file that must be uploaded first, with the credential to upload it.
    Upload { file: ImageFile, token: BearerToken },
}

/// Admin input for creating a product.
#[derive(Debug)]
pub struct ProductForm {
    pub name: String,
    pub description: String,
    /// Price in currency units (e.g. `12.99`).
    pub price: Decimal,
    pub category: String,
    pub image: Option<ImageSource>,
}

impl ProductForm {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        price: Decimal,
        category: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            price,
            category: category.into(),
            image: None,
        }
    }

    pub fn with_image(mut self, image: ImageSource) -> Self {
        self.image = Some(image);
        self
    }

    /// Validates the form and returns the price in cents.
    pub fn validate(&self) -> Result<Money, CatalogError> {
        validate_name(&self.name)?;
        validate_description(&self.description)?;
        if self.category.trim().is_empty() {
            return Err(CatalogError::CategoryRequired);
        }
        if self.price < Decimal::ZERO {
            return Err(CatalogError::InvalidPrice);
        }
        Money::from_decimal(self.price).ok_or(CatalogError::InvalidPrice)
    }
}

/// Partial product update. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<bool>,
}

impl ProductPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(description) = &self.description {
            validate_description(description)?;
        }
        if self.price.is_some_and(|p| p.is_negative()) {
            return Err(CatalogError::InvalidPrice);
        }
        if self.category.as_ref().is_some_and(|c| c.trim().is_empty()) {
            return Err(CatalogError::CategoryRequired);
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<(), CatalogError> {
    let len = name.trim().chars().count();
    if !(PRODUCT_NAME_MIN_LEN..=PRODUCT_NAME_MAX_LEN).contains(&len) {
        return Err(CatalogError::InvalidProductName {
            min: PRODUCT_NAME_MIN_LEN,
            max: PRODUCT_NAME_MAX_LEN,
        });
    }
    Ok(())
}

fn validate_description(description: &str) -> Result<(), CatalogError> {
    if description.chars().count() > PRODUCT_DESCRIPTION_MAX_LEN {
        return Err(CatalogError::DescriptionTooLong {
            max: PRODUCT_DESCRIPTION_MAX_LEN,
        });
    }
    Ok(())
}

/// A menu category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Category {
    /// Returns true if `name` refers to this category, ignoring case and
    /// surrounding whitespace.
    pub fn has_name(&self, name: &str) -> bool {
        self.name.trim().eq_ignore_ascii_case(name.trim())
    }
}

/// The built-in menu used when no snapshot exists.
pub fn default_products(now: DateTime<Utc>) -> Vec<Product> {
    let seed = |id: &str, name: &str, description: &str, cents: i64, category: &str| Product {
        id: ProductId::new(id),
        name: name.to_string(),
        description: description.to_string(),
        price: Money::from_cents(cents),
        category: category.to_string(),
        image: None,
        available: true,
        created_at: now,
        updated_at: now,
    };

    vec![
        seed(
            "1",
            "Classic Burger",
            "Juicy beef patty with lettuce, tomato, and our special sauce",
            1299,
            "Burgers",
        ),
        seed(
            "2",
            "Chicken Caesar Salad",
            "Fresh romaine lettuce with grilled chicken, parmesan, and caesar dressing",
            1099,
            "Salads",
        ),
        seed(
            "3",
            "French Fries",
            "Crispy golden fries seasoned with sea salt",
            499,
            "Sides",
        ),
        seed(
            "4",
            "Chocolate Cake",
            "Rich chocolate cake with chocolate frosting",
            699,
            "Desserts",
        ),
        seed("5", "Coffee", "Freshly brewed coffee", 299, "Drinks"),
    ]
}

/// The built-in categories used when no snapshot exists.
pub fn default_categories(now: DateTime<Utc>) -> Vec<Category> {
    ["All Items", "Burgers", "Sides", "Desserts", "Drinks"]
        .into_iter()
        .enumerate()
        .map(|(i, name)| Category {
            id: CategoryId::new((i + 1).to_string()),
            name: name.to_string(),
            description: None,
            created_at: now,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn form(name: &str, price: &str) -> ProductForm {
        ProductForm::new(name, "Tasty", Decimal::from_str(price).unwrap(), "Burgers")
    }

    #[test]
    fn form_validation() {
        assert_eq!(form("Veggie Burger", "11.50").validate(), Ok(Money::from_cents(1150)));
        assert_eq!(form("Tap Water", "0").validate(), Ok(Money::zero()));

        assert_eq!(
            form("X", "1").validate(),
            Err(CatalogError::InvalidProductName { min: 2, max: 100 })
        );
        assert_eq!(
            form(&"a".repeat(101), "1").validate(),
            Err(CatalogError::InvalidProductName { min: 2, max: 100 })
        );
        assert_eq!(form("Burger", "-0.01").validate(), Err(CatalogError::InvalidPrice));

        let mut no_category = form("Burger", "1");
        no_category.category = "  ".to_string();
        assert_eq!(no_category.validate(), Err(CatalogError::CategoryRequired));

        let mut long = form("Burger", "1");
        long.description = "d".repeat(501);
        assert_eq!(
            long.validate(),
            Err(CatalogError::DescriptionTooLong { max: 500 })
        );
    }

    #[test]
    fn patch_validation() {
        assert!(ProductPatch::default().is_empty());
        assert!(ProductPatch::default().validate().is_ok());

        let negative = ProductPatch {
            price: Some(Money::from_cents(-1)),
            ..Default::default()
        };
        assert_eq!(negative.validate(), Err(CatalogError::InvalidPrice));

        let short_name = ProductPatch {
            name: Some("a".to_string()),
            ..Default::default()
        };
        assert!(short_name.validate().is_err());
    }

    #[test]
    fn apply_patch_merges_and_stamps() {
        let created = Utc::now();
        let mut product = default_products(created).remove(0);
        let later = created + chrono::Duration::minutes(5);

        product.apply_patch(
            &ProductPatch {
                price: Some(Money::from_cents(1399)),
                available: Some(false),
                ..Default::default()
            },
            later,
        );

        assert_eq!(product.name, "Classic Burger");
        assert_eq!(product.price, Money::from_cents(1399));
        assert!(!product.available);
        assert_eq!(product.created_at, created);
        assert_eq!(product.updated_at, later);
    }

    #[test]
    fn patch_serializes_only_present_fields() {
        let patch = ProductPatch {
            available: Some(false),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            serde_json::json!({"available": false})
        );
    }

    #[test]
    fn seeds() {
        let now = Utc::now();
        let products = default_products(now);
        assert_eq!(products.len(), 5);
        assert_eq!(products[0].price, Money::from_cents(1299));
        assert!(products.iter().all(|p| p.available));

        let categories = default_categories(now);
        let names: Vec<_> = categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["All Items", "Burgers", "Sides", "Desserts", "Drinks"]);
        assert!(categories[1].has_name(" burgers "));
    }

    #[test]
    fn product_json_shape() {
        let product = default_products(Utc::now()).remove(4);
        let json = serde_json::to_value(&product).unwrap();
        assert_eq!(json["name"], "Coffee");
        assert_eq!(json["price"], 299);
        assert!(json.get("createdAt").is_some());
        assert!(json.get("image").is_none());
    }
}
