//! Admin product endpoints.

use std::str::FromStr;
use std::sync::Arc;

use axum::Json;
use axum::extract::{FromRequest, Multipart, Path, Request, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use domain::{
    CatalogError, DomainError, ImageSource, Money, Product, ProductForm, ProductId, ProductPatch,
};
use persistence::BearerToken;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::AppState;
use crate::auth::AdminAuth;
use crate::error::ApiError;
use crate::routes::upload::MultipartForm;

/// JSON body for creating a product with an already hosted image.
#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    pub category: String,
    #[serde(default)]
    pub image: Option<String>,
}

impl CreateProductRequest {
    fn into_form(self) -> ProductForm {
        let form = ProductForm::new(self.name, self.description, self.price, self.category);
        match self.image {
            Some(url) => form.with_image(ImageSource::Url(url)),
            None => form,
        }
    }
}

/// JSON body for a partial product update. Prices are in currency units.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub category: Option<String>,
    pub image: Option<String>,
    pub available: Option<bool>,
}

impl UpdateProductRequest {
    fn into_patch(self) -> Result<ProductPatch, DomainError> {
        let price = match self.price {
            Some(price) => Some(Money::from_decimal(price).ok_or(CatalogError::InvalidPrice)?),
            None => None,
        };
        Ok(ProductPatch {
            name: self.name,
            description: self.description,
            price,
            category: self.category,
            image: self.image,
            available: self.available,
        })
    }
}

fn is_multipart(request: &Request) -> bool {
    request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"))
}

/// Builds a form from multipart fields; an attached file is uploaded with
/// the caller's credential when the product is added.
fn form_from_multipart(form: MultipartForm, token: BearerToken) -> Result<ProductForm, ApiError> {
    let price = form
        .text("price")
        .map(Decimal::from_str)
        .transpose()
        .map_err(|_| ApiError::BadRequest("Price must be a number".to_string()))?
        .ok_or_else(|| ApiError::BadRequest("Price is required".to_string()))?;

    let product = ProductForm::new(
        form.text("name").unwrap_or_default(),
        form.text("description").unwrap_or_default(),
        price,
        form.text("category").unwrap_or_default(),
    );

    let image_url = form.text("imageUrl").map(str::to_string);
    let image = match (form.image, image_url) {
        (Some(file), _) => Some(ImageSource::Upload { file, token }),
        (None, Some(url)) => Some(ImageSource::Url(url)),
        (None, None) => None,
    };
    Ok(match image {
        Some(image) => product.with_image(image),
        None => product,
    })
}

/// GET /admin/products: every product, including unavailable ones.
pub async fn list(State(state): State<Arc<AppState>>, _auth: AdminAuth) -> Json<Vec<Product>> {
    Json(state.store.products().await)
}

/// GET /admin/products/{id}
pub async fn get(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Path(id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    let id = ProductId::new(id);
    state
        .store
        .product(&id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Product not found: {id}")))
}

/// POST /admin/products: accepts JSON or a multipart form with an image file.
#[tracing::instrument(skip_all)]
pub async fn create(
    State(state): State<Arc<AppState>>,
    AdminAuth(token): AdminAuth,
    request: Request,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let form = if is_multipart(&request) {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        form_from_multipart(MultipartForm::read(multipart).await?, token)?
    } else {
        let Json(body) = Json::<CreateProductRequest>::from_request(request, &state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        body.into_form()
    };

    let result = state.store.add_product(form).await;
    let result = state.notify(result, |r| {
        r.value
            .as_ref()
            .map(|p| format!("{} added to the menu", p.name))
    })?;

    let product = result
        .value
        .ok_or_else(|| ApiError::Internal("Product missing after insert".to_string()))?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// PATCH /admin/products/{id}
#[tracing::instrument(skip(state, _auth, req))]
pub async fn update(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Path(id): Path<String>,
    Json(req): Json<UpdateProductRequest>,
) -> Result<Json<Product>, ApiError> {
    let id = ProductId::new(id);
    let result = match req.into_patch() {
        Ok(patch) => state.store.update_product(&id, patch).await,
        Err(err) => Err(err),
    }
    .map_err(ApiError::from)
    .and_then(|r| {
        r.value
            .ok_or_else(|| ApiError::NotFound(format!("Product not found: {id}")))
    });

    let product = state.notify(result, |p| Some(format!("{} updated", p.name)))?;
    Ok(Json(product))
}

/// DELETE /admin/products/{id}
#[tracing::instrument(skip(state, _auth))]
pub async fn delete(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = ProductId::new(id);
    let result = state
        .store
        .delete_product(&id)
        .await
        .map_err(ApiError::from)
        .and_then(|r| {
            r.value
                .then_some(())
                .ok_or_else(|| ApiError::NotFound(format!("Product not found: {id}")))
        });

    state.notify(result, |_| Some("Product deleted".to_string()))?;
    Ok(StatusCode::NO_CONTENT)
}
