//! Admin settings endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use domain::{RestaurantSettings, SettingsPatch};

use crate::AppState;
use crate::auth::AdminAuth;
use crate::error::ApiError;

/// GET /admin/settings
pub async fn get(State(state): State<Arc<AppState>>, _auth: AdminAuth) -> Json<RestaurantSettings> {
    Json(state.store.settings().await)
}

/// PATCH /admin/settings: shallow-merges the given fields.
#[tracing::instrument(skip(state, _auth))]
pub async fn update(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Json(patch): Json<SettingsPatch>,
) -> Result<Json<RestaurantSettings>, ApiError> {
    let result = state.store.update_settings(patch).await;
    let result = state.notify(result, |r| {
        (!r.is_noop()).then(|| "Settings saved".to_string())
    })?;
    Ok(Json(result.value))
}
