//! Admin setup, sign-in and sign-out.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use domain::AdminSetupForm;
use persistence::AdminProfile;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::auth::AdminAuth;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupRequest {
    pub email: String,
    pub username: Option<String>,
    pub password: String,
    pub confirm_password: String,
}

/// A signed-in admin and the bearer token for admin routes.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub profile: AdminProfile,
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionStatus {
    pub authenticated: bool,
    pub profile: Option<AdminProfile>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupStatus {
    pub admin_exists: bool,
}

/// POST /admin/session
#[tracing::instrument(skip_all)]
pub async fn sign_in(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignInRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let password = SecretString::from(req.password);
    let result = state.store.sign_in(&req.email, &password).await;
    let profile = state.notify(result, |p| Some(format!("Welcome back, {}", p.username)))?;

    Ok(Json(SessionResponse {
        profile,
        token: state.store.session_token().await,
    }))
}

/// GET /admin/session: re-reads the identity service's session.
pub async fn status(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
) -> Result<Json<SessionStatus>, ApiError> {
    let cache = state.store.refresh_identity().await?;
    Ok(Json(SessionStatus {
        authenticated: cache.authenticated,
        profile: cache.profile,
    }))
}

/// DELETE /admin/session
#[tracing::instrument(skip_all)]
pub async fn sign_out(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
) -> Result<StatusCode, ApiError> {
    let result = state.store.sign_out().await;
    state.notify(result, |_| Some("Signed out".to_string()))?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /admin/setup: whether the first admin account exists yet.
pub async fn setup_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SetupStatus>, ApiError> {
    Ok(Json(SetupStatus {
        admin_exists: state.store.check_admin_exists().await?,
    }))
}

/// POST /admin/setup: creates the first admin account and signs it in.
#[tracing::instrument(skip_all)]
pub async fn setup(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SetupRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let form = AdminSetupForm {
        email: req.email,
        username: req.username,
        password: SecretString::from(req.password),
        confirm_password: SecretString::from(req.confirm_password),
    };
    let result = state.store.setup_admin(form).await;
    let profile = state.notify(result, |p| {
        Some(format!("Admin account created for {}", p.email))
    })?;

    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            profile,
            token: state.store.session_token().await,
        }),
    ))
}
