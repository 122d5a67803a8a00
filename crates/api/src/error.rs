//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{AdminError, DomainError, OrderError};
use persistence::{IdentityError, UploadError};
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found.
    #[error("{0}")]
    NotFound(String),

    /// Bad request from the client.
    #[error("{0}")]
    BadRequest(String),

    /// Missing or rejected admin credentials.
    #[error("{0}")]
    Unauthorized(String),

    /// Domain logic error.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Image upload or deletion error.
    #[error(transparent)]
    Upload(#[from] UploadError),

    /// Internal server error.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Domain(err) => domain_error_status(err),
            ApiError::Upload(err) => upload_error_status(err),
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        metrics::counter!("api_errors_total", "status" => status.as_u16().to_string()).increment(1);
        if status.is_server_error() {
            tracing::error!(error = %message, %status, "request failed");
        }

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn domain_error_status(err: &DomainError) -> StatusCode {
    match err {
        DomainError::Order(OrderError::InvalidStatusTransition { .. })
        | DomainError::Admin(AdminError::AlreadyConfigured)
        | DomainError::Identity(IdentityError::EmailInUse) => StatusCode::CONFLICT,
        DomainError::Admin(AdminError::TooManyAttempts { .. }) => StatusCode::TOO_MANY_REQUESTS,
        DomainError::Identity(
            IdentityError::InvalidCredentials
            | IdentityError::AccessDenied
            | IdentityError::NotAuthenticated,
        ) => StatusCode::UNAUTHORIZED,
        DomainError::Upload(err) => upload_error_status(err),
        _ if err.is_not_found() => StatusCode::NOT_FOUND,
        _ if err.is_validation() => StatusCode::BAD_REQUEST,
        DomainError::Identity(_) | DomainError::Persistence(_) | DomainError::Sync(_) => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn upload_error_status(err: &UploadError) -> StatusCode {
    match err {
        UploadError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        UploadError::InvalidFile(_) | UploadError::MissingFile => StatusCode::BAD_REQUEST,
        UploadError::Storage(_) => StatusCode::BAD_GATEWAY,
        UploadError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
