//! Notification feed endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use notifications::{NotificationId, VisibleNotification};

use crate::AppState;
use crate::error::ApiError;

/// GET /notifications: active notifications, top to bottom.
pub async fn list(State(state): State<Arc<AppState>>) -> Json<Vec<VisibleNotification>> {
    Json(state.notifications.visible())
}

/// DELETE /notifications/{id}
pub async fn dismiss(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id: NotificationId = id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid notification id: {id}")))?;

    if state.notifications.remove(id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Notification not found: {id}")))
    }
}
