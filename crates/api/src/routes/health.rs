//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// False while a mutation is waiting to be persisted or the last write failed.
    pub persisted: bool,
}

/// GET /health: returns liveness and persistence status.
pub async fn check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        persisted: !state.store.is_dirty(),
    })
}
