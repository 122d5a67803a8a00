//! Public menu endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use domain::{Category, Product, RestaurantSettings};
use serde::{Deserialize, Serialize};

use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct MenuQuery {
    /// Restricts products to one category name.
    pub category: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuResponse {
    pub restaurant: RestaurantSettings,
    pub categories: Vec<Category>,
    pub products: Vec<Product>,
}

/// GET /menu: available products with the category list.
pub async fn get(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MenuQuery>,
) -> Json<MenuResponse> {
    let products = match query.category.as_deref().map(str::trim) {
        Some(category) if !category.is_empty() && !category.eq_ignore_ascii_case("all") => state
            .store
            .products_in_category(category)
            .await
            .into_iter()
            .filter(|p| p.available)
            .collect(),
        _ => state.store.available_products().await,
    };

    Json(MenuResponse {
        restaurant: state.store.settings().await,
        categories: state.store.categories().await,
        products,
    })
}
