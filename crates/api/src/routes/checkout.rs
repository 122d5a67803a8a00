//! Checkout endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use domain::Order;
use serde::Deserialize;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[serde(default)]
    pub table_number: String,
}

/// POST /checkout: turns the cart into a pending order.
///
/// Waits for the order to be persisted. A failed write does not undo the
/// order; it is reported as a warning and retried with the next mutation.
#[tracing::instrument(skip(state))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let result = state.store.create_order(&req.table_number).await;
    let result = state.notify(result, |r| {
        r.value.as_ref().map(|order| {
            format!(
                "Order #{} placed for table {}",
                order.order_number, order.table_number
            )
        })
    })?;

    let order = result
        .value
        .ok_or_else(|| ApiError::Internal("Order missing after checkout".to_string()))?;

    if let Err(err) = result.sync.wait().await {
        tracing::warn!(order_id = %order.id, error = %err, "order not yet persisted");
        state
            .notifications
            .warning(format!("Order #{} is not saved yet", order.order_number));
    }

    Ok((StatusCode::CREATED, Json(order)))
}
