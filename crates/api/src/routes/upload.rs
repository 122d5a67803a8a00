//! Image upload endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use persistence::{ImageFile, UploadError, UploadedImage};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::auth::AdminAuth;
use crate::error::ApiError;

/// Multipart field names accepted for the image file.
pub const IMAGE_FIELDS: [&str; 2] = ["image", "file"];

/// Text fields and the optional image file of a multipart form.
#[derive(Debug, Default)]
pub struct MultipartForm {
    pub fields: HashMap<String, String>,
    pub image: Option<ImageFile>,
}

impl MultipartForm {
    /// Reads every field. A part named `image` or `file` with a filename is the file.
    pub async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            let filename = field.file_name().map(str::to_string);

            match filename {
                Some(filename) if IMAGE_FIELDS.contains(&name.as_str()) => {
                    let content_type = field
                        .content_type()
                        .unwrap_or("application/octet-stream")
                        .to_string();
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::BadRequest(e.body_text()))?;
                    if !bytes.is_empty() {
                        form.image = Some(ImageFile::new(filename, content_type, bytes.to_vec()));
                    }
                }
                _ => {
                    let value = field
                        .text()
                        .await
                        .map_err(|e| ApiError::BadRequest(e.body_text()))?;
                    form.fields.insert(name, value);
                }
            }
        }

        Ok(form)
    }

    /// A trimmed, non-empty text field.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    #[serde(flatten)]
    pub image: UploadedImage,
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
}

/// POST /api/upload: stores an image and returns its public URL.
#[tracing::instrument(skip_all)]
pub async fn create(
    State(state): State<Arc<AppState>>,
    AdminAuth(token): AdminAuth,
    multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let result = async {
        let form = MultipartForm::read(multipart).await?;
        let file = form.image.ok_or(UploadError::MissingFile)?;
        Ok::<_, ApiError>(state.images.upload(&token, file).await?)
    }
    .await;

    let image = state.notify(result, |_| Some("Image uploaded".to_string()))?;
    tracing::info!(filename = %image.filename, size = image.size, "image uploaded");

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            success: true,
            image,
        }),
    ))
}

/// DELETE /api/upload?url=: removes a stored image.
#[tracing::instrument(skip(state, token))]
pub async fn delete(
    State(state): State<Arc<AppState>>,
    AdminAuth(token): AdminAuth,
    Query(query): Query<DeleteQuery>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let url = query
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Image URL is required".to_string()))?;

    let deleted = state.images.delete(&token, &url).await?;
    Ok(Json(DeleteResponse { success: deleted }))
}
