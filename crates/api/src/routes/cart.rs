//! Cart endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use domain::{Cart, CartItem, PriceBreakdown, ProductId};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    pub product_id: ProductId,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    /// Zero or less removes the line.
    pub quantity: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartResponse {
    pub items: Vec<CartItem>,
    pub item_count: u32,
    pub breakdown: PriceBreakdown,
}

impl CartResponse {
    async fn build(state: &AppState, cart: Cart) -> Self {
        Self {
            item_count: cart.item_count(),
            items: cart.items().to_vec(),
            breakdown: state.store.cart_breakdown().await,
        }
    }
}

/// GET /cart
pub async fn get(State(state): State<Arc<AppState>>) -> Json<CartResponse> {
    let cart = state.store.cart().await;
    Json(CartResponse::build(&state, cart).await)
}

/// POST /cart/items
#[tracing::instrument(skip(state))]
pub async fn add(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddItemRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let result = state
        .store
        .add_to_cart(&req.product_id, req.quantity)
        .await;
    let result = state.notify(result, |r| {
        r.value
            .get(&req.product_id)
            .map(|item| format!("Added {} to cart", item.product.name))
    })?;

    Ok(Json(CartResponse::build(&state, result.value).await))
}

/// PUT /cart/items/{product_id}
#[tracing::instrument(skip(state))]
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<String>,
    Json(req): Json<UpdateItemRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let product_id = ProductId::new(product_id);
    let result = state
        .store
        .update_cart_item(&product_id, req.quantity)
        .await;
    let result = state.notify(result, |_| None)?;

    Ok(Json(CartResponse::build(&state, result.value).await))
}

/// DELETE /cart/items/{product_id}
#[tracing::instrument(skip(state))]
pub async fn remove(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<String>,
) -> Result<Json<CartResponse>, ApiError> {
    let product_id = ProductId::new(product_id);
    let result = state.store.remove_from_cart(&product_id).await;
    let result = state.notify(result, |r| {
        (!r.is_noop()).then(|| "Item removed from cart".to_string())
    })?;

    Ok(Json(CartResponse::build(&state, result.value).await))
}

/// DELETE /cart
#[tracing::instrument(skip(state))]
pub async fn clear(State(state): State<Arc<AppState>>) -> Result<Json<CartResponse>, ApiError> {
    let result = state.store.clear_cart().await;
    let result = state.notify(result, |r| {
        (!r.is_noop()).then(|| "Cart cleared".to_string())
    })?;

    Ok(Json(CartResponse::build(&state, result.value).await))
}
