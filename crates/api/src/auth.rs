//! Bearer authentication for admin routes.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use persistence::BearerToken;

use crate::AppState;
use crate::error::ApiError;

/// Extractor that admits requests carrying an accepted admin bearer token.
///
/// The header is checked before the body is read, so uploads without a
/// credential are refused before any file handling.
#[derive(Debug)]
pub struct AdminAuth(pub BearerToken);

impl FromRequestParts<Arc<AppState>> for AdminAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        let token = BearerToken::from_header(header)?;

        if !state.accepts_admin_token(token.expose()).await {
            tracing::warn!(path = %parts.uri.path(), "rejected admin token");
            return Err(ApiError::Unauthorized(
                "Invalid or expired admin token".to_string(),
            ));
        }
        Ok(AdminAuth(token))
    }
}
