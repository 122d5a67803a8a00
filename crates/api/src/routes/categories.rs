//! Admin category endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use domain::{Category, CategoryId};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::auth::AdminAuth;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
}

/// A category with the number of products listed under it.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummary {
    #[serde(flatten)]
    pub category: Category,
    pub product_count: usize,
}

/// GET /admin/categories
pub async fn list(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
) -> Json<Vec<CategorySummary>> {
    let mut summaries = Vec::new();
    for category in state.store.categories().await {
        let product_count = state.store.product_count(&category.name).await;
        summaries.push(CategorySummary {
            category,
            product_count,
        });
    }
    Json(summaries)
}

/// POST /admin/categories
#[tracing::instrument(skip(state, _auth))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Json(req): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let result = state
        .store
        .add_category(&req.name, req.description)
        .await
        .map_err(ApiError::from)
        .and_then(|r| {
            r.value
                .ok_or_else(|| ApiError::Internal("Category missing after insert".to_string()))
        });

    let category = state.notify(result, |c| Some(format!("Category {} added", c.name)))?;
    Ok((StatusCode::CREATED, Json(category)))
}

/// DELETE /admin/categories/{id}: refused while products still use it.
#[tracing::instrument(skip(state, _auth))]
pub async fn delete(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = CategoryId::new(id);
    let result = state
        .store
        .delete_category(&id)
        .await
        .map_err(ApiError::from)
        .and_then(|r| {
            r.value
                .then_some(())
                .ok_or_else(|| ApiError::NotFound(format!("Category not found: {id}")))
        });

    state.notify(result, |_| Some("Category deleted".to_string()))?;
    Ok(StatusCode::NO_CONTENT)
}
