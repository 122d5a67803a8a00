//! Admin order history endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{Datelike, NaiveDate, Utc};
use domain::{Order, OrderFilters, OrderId, OrderStatus};
use serde::Deserialize;

use crate::AppState;
use crate::auth::AdminAuth;
use crate::error::ApiError;

/// Confirmation phrase required to clear the order history.
pub const CLEAR_CONFIRMATION: &str = "CLEAR";

/// Order history query string. Blank values and `status=all` are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrdersQuery {
    pub status: Option<String>,
    pub table: Option<String>,
    pub order_id: Option<String>,
    /// `YYYY-MM-DD`
    pub date: Option<String>,
    /// 1-12; the year defaults to the current one.
    pub month: Option<String>,
    pub year: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl OrdersQuery {
    pub fn into_filters(self) -> Result<OrderFilters, ApiError> {
        let mut filters = OrderFilters::new();

        if let Some(status) = present(&self.status)
            && !status.eq_ignore_ascii_case("all")
        {
            let status: OrderStatus = status.parse().map_err(ApiError::BadRequest)?;
            filters = filters.with_status(status);
        }
        if let Some(table) = present(&self.table) {
            filters = filters.with_table_number(table);
        }
        if let Some(order_id) = present(&self.order_id) {
            filters = filters.with_order_id(order_id);
        }
        if let Some(date) = present(&self.date) {
            let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .map_err(|_| ApiError::BadRequest(format!("Invalid date: {date}")))?;
            filters = filters.with_date(date);
        }

        match (present(&self.month), present(&self.year)) {
            (Some(month), year) => {
                let month = month
                    .parse::<u32>()
                    .ok()
                    .filter(|m| (1..=12).contains(m))
                    .ok_or_else(|| ApiError::BadRequest(format!("Invalid month: {month}")))?;
                let year = match year {
                    Some(year) => year
                        .parse::<i32>()
                        .map_err(|_| ApiError::BadRequest(format!("Invalid year: {year}")))?,
                    None => Utc::now().year(),
                };
                filters = filters.with_month(month, year);
            }
            (None, Some(_)) => {
                return Err(ApiError::BadRequest(
                    "The year filter requires a month".to_string(),
                ));
            }
            (None, None) => {}
        }

        Ok(filters)
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize)]
pub struct ClearHistoryRequest {
    #[serde(default)]
    pub confirm: String,
}

/// GET /admin/orders
#[tracing::instrument(skip(state, _auth))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Query(query): Query<OrdersQuery>,
) -> Result<Json<Vec<Order>>, ApiError> {
    let filters = query.into_filters()?;
    Ok(Json(state.store.filtered_orders(&filters).await))
}

/// GET /admin/orders/{id}
pub async fn get(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let id = OrderId::new(id);
    state
        .store
        .find_order(&id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Order not found: {id}")))
}

/// POST /admin/orders/{id}/status: completes or cancels a pending order.
#[tracing::instrument(skip(state, _auth))]
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<Order>, ApiError> {
    let id = OrderId::new(id);
    let result = state
        .store
        .update_order_status(&id, req.status)
        .await
        .map_err(ApiError::from)
        .and_then(|r| {
            r.value
                .ok_or_else(|| ApiError::NotFound(format!("Order not found: {id}")))
        });

    let order = state.notify(result, |o| {
        Some(format!("Order #{} marked {}", o.order_number, o.status))
    })?;
    Ok(Json(order))
}

/// DELETE /admin/orders: deletes every order and restarts numbering.
///
/// The body must be `{"confirm": "CLEAR"}`.
#[tracing::instrument(skip(state, _auth))]
pub async fn clear(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Json(req): Json<ClearHistoryRequest>,
) -> Result<StatusCode, ApiError> {
    if req.confirm != CLEAR_CONFIRMATION {
        return Err(ApiError::BadRequest(format!(
            "Type {CLEAR_CONFIRMATION} to confirm clearing the order history"
        )));
    }

    let result = state.store.clear_order_history().await;
    let result = state.notify(result, |_| Some("Order history cleared".to_string()))?;
    if let Err(err) = result.sync.wait().await {
        tracing::warn!(error = %err, "cleared history not yet persisted");
    }
    Ok(StatusCode::NO_CONTENT)
}
