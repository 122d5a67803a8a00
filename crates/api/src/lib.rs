//! HTTP API server with observability for the restaurant ordering system.
//!
//! Exposes the menu, cart, checkout and admin operations of the
//! [`RestaurantStore`] as JSON endpoints, with structured logging (tracing)
//! and Prometheus metrics. Store mutations post user feedback to the shared
//! [`NotificationCenter`].

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post, put};
use domain::RestaurantStore;
use metrics_exporter_prometheus::PrometheusHandle;
use notifications::NotificationCenter;
use persistence::{
    DocumentGateway, FileIdentityService, FileSnapshotSlot, ImageStorage, LocalImageStorage,
    PersistenceError, PostgresDocumentGateway, UploadOptions,
};
use secrecy::{ExposeSecret, SecretString};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use error::ApiError;

/// Room for multipart boundaries and text fields on top of the image itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Shared application state.
pub struct AppState {
    pub store: RestaurantStore,
    pub notifications: NotificationCenter,
    pub images: Arc<dyn ImageStorage>,
    /// Static bearer token accepted on admin routes in addition to the
    /// identity service's session token.
    pub admin_token: Option<SecretString>,
}

impl AppState {
    pub fn new(
        store: RestaurantStore,
        images: Arc<dyn ImageStorage>,
        admin_token: Option<SecretString>,
    ) -> Self {
        Self {
            store,
            notifications: NotificationCenter::new(),
            images,
            admin_token,
        }
    }

    /// Returns true if `token` may call admin routes.
    pub async fn accepts_admin_token(&self, token: &str) -> bool {
        if let Some(expected) = &self.admin_token
            && expected.expose_secret() == token
        {
            return true;
        }
        self.store.verify_admin_token(token).await
    }

    /// Posts the outcome of a store operation to the notification center.
    ///
    /// Failures are always posted; `on_success` returns `None` to stay quiet.
    pub fn notify<T, E>(
        &self,
        result: Result<T, E>,
        on_success: impl FnOnce(&T) -> Option<String>,
    ) -> Result<T, ApiError>
    where
        ApiError: From<E>,
    {
        match result.map_err(ApiError::from) {
            Ok(value) => {
                if let Some(message) = on_success(&value) {
                    self.notifications.success(message);
                }
                Ok(value)
            }
            Err(err) => {
                self.notifications.error(err.to_string());
                Err(err)
            }
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let body_limit =
        DefaultBodyLimit::max(state.images.options().max_bytes + MULTIPART_OVERHEAD_BYTES);

    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    let admin_router = Router::new()
        .route(
            "/session",
            get(routes::session::status)
                .post(routes::session::sign_in)
                .delete(routes::session::sign_out),
        )
        .route(
            "/setup",
            get(routes::session::setup_status).post(routes::session::setup),
        )
        .route(
            "/products",
            get(routes::products::list).post(routes::products::create),
        )
        .route(
            "/products/{id}",
            get(routes::products::get)
                .patch(routes::products::update)
                .delete(routes::products::delete),
        )
        .route(
            "/categories",
            get(routes::categories::list).post(routes::categories::create),
        )
        .route("/categories/{id}", delete(routes::categories::delete))
        .route(
            "/orders",
            get(routes::orders::list).delete(routes::orders::clear),
        )
        .route("/orders/{id}", get(routes::orders::get))
        .route("/orders/{id}/status", post(routes::orders::update_status))
        .route(
            "/settings",
            get(routes::settings::get).patch(routes::settings::update),
        )
        .layer(body_limit.clone());

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/menu", get(routes::menu::get))
        .route("/cart", get(routes::cart::get).delete(routes::cart::clear))
        .route("/cart/items", post(routes::cart::add))
        .route(
            "/cart/items/{product_id}",
            put(routes::cart::update).delete(routes::cart::remove),
        )
        .route("/checkout", post(routes::checkout::create))
        .route("/notifications", get(routes::notifications::list))
        .route(
            "/notifications/{id}",
            delete(routes::notifications::dismiss),
        )
        .route(
            "/api/upload",
            post(routes::upload::create)
                .delete(routes::upload::delete)
                .layer(body_limit),
        )
        .nest("/admin", admin_router)
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the default application state from configuration.
///
/// The snapshot and the admin accounts live in files, images in a local
/// directory. Mutations are mirrored to Postgres when `DATABASE_URL` is set.
pub async fn create_default_state(config: &Config) -> persistence::Result<Arc<AppState>> {
    let slot = Arc::new(FileSnapshotSlot::new(config.snapshot_path.clone()));
    let images: Arc<dyn ImageStorage> = Arc::new(
        LocalImageStorage::new(&config.upload_dir, config.upload_public_prefix.clone())
            .with_options(UploadOptions::with_max_bytes(config.upload_max_bytes)),
    );

    let identity = FileIdentityService::open(config.admin_accounts_path.clone())
        .await
        .map_err(|e| PersistenceError::Unavailable(e.to_string()))?;

    let mut builder = RestaurantStore::builder(slot)
        .with_images(images.clone())
        .with_identity(Arc::new(identity));

    if let Some(url) = &config.database_url {
        let gateway = PostgresDocumentGateway::connect(url.expose_secret()).await?;
        gateway.run_migrations().await?;
        tracing::info!("mirroring mutations to Postgres");
        builder = builder.with_gateway(Arc::new(gateway) as Arc<dyn DocumentGateway>);
    }

    let store = builder.open().await;
    Ok(Arc::new(AppState::new(
        store,
        images,
        config.admin_api_token.clone(),
    )))
}
