//! The domain store service.
//!
//! [`RestaurantStore`] owns the [`RestaurantState`] behind a lock. Every
//! mutation is validated by a command method on the state, applied in
//! memory, and then handed to the background writer for persistence. Memory
//! is never rolled back when persisting fails; [`RestaurantStore::is_dirty`]
//! reports the gap instead.

mod sync;

pub use sync::{ORDER_COUNTER, SETTINGS_DOCUMENT, SyncError, SyncHandle};

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use common::{CategoryId, OrderId, ProductId};
use persistence::{AdminProfile, DocumentGateway, IdentityError, IdentityService, ImageStorage};
use persistence::{SnapshotSlot, UploadError};
use secrecy::SecretString;
use tokio::sync::RwLock;

use crate::admin::{AdminCache, AdminError, AdminSetupForm, LoginRateLimiter};
use crate::aggregate::{Aggregate, DomainEvent};
use crate::cart::Cart;
use crate::catalog::{Category, ImageSource, Product, ProductForm, ProductPatch};
use crate::error::{DomainError, Result};
use crate::events::StoreEvent;
use crate::order::{Order, OrderFilters, OrderStatus};
use crate::settings::{PriceBreakdown, RestaurantSettings, SettingsPatch};
use crate::snapshot;
use crate::state::RestaurantState;
use sync::{SyncWriter, mirror_ops};

/// How long the writer waits to batch queued mutations.
pub const DEFAULT_SYNC_DEBOUNCE: Duration = Duration::from_millis(50);

/// Result of a store mutation.
#[derive(Debug)]
pub struct CommandResult<T> {
    /// Value read from the state right after the events were applied.
    pub value: T,

    /// The events that were applied. Empty if the command was a no-op.
    pub events: Vec<StoreEvent>,

    /// Resolves once the mutation is persisted.
    pub sync: SyncHandle,
}

impl<T> CommandResult<T> {
    /// Waits for persistence and returns the value.
    pub async fn synced(self) -> Result<T> {
        self.sync.wait().await?;
        Ok(self.value)
    }

    pub fn is_noop(&self) -> bool {
        self.events.is_empty()
    }
}

/// Builder for [`RestaurantStore`].
pub struct RestaurantStoreBuilder {
    slot: Arc<dyn SnapshotSlot>,
    gateway: Option<Arc<dyn DocumentGateway>>,
    images: Option<Arc<dyn ImageStorage>>,
    identity: Option<Arc<dyn IdentityService>>,
    debounce: Duration,
    login_limiter: LoginRateLimiter,
}

impl RestaurantStoreBuilder {
    /// Mirrors every persisted mutation to a document gateway.
    pub fn with_gateway(mut self, gateway: Arc<dyn DocumentGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn with_images(mut self, images: Arc<dyn ImageStorage>) -> Self {
        self.images = Some(images);
        self
    }

    pub fn with_identity(mut self, identity: Arc<dyn IdentityService>) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_login_limiter(mut self, limiter: LoginRateLimiter) -> Self {
        self.login_limiter = limiter;
        self
    }

    /// Restores the persisted state and starts the sync writer.
    ///
    /// Never fails: a missing or corrupted snapshot yields the default state.
    pub async fn open(self) -> RestaurantStore {
        let state = load_persisted_state(self.slot.as_ref()).await;
        let sync = SyncWriter::spawn(self.slot, self.gateway, self.debounce);

        RestaurantStore {
            state: RwLock::new(state),
            images: self.images,
            identity: self.identity,
            login_limiter: Mutex::new(self.login_limiter),
            sync,
        }
    }
}

/// Reads and decodes the snapshot slot, discarding anything unreadable.
#[tracing::instrument(skip_all, fields(slot = slot.key()))]
pub async fn load_persisted_state(slot: &dyn SnapshotSlot) -> RestaurantState {
    let raw = match slot.load().await {
        Ok(Some(raw)) if !raw.trim().is_empty() => raw,
        Ok(_) => {
            tracing::info!("no persisted state, starting from defaults");
            return RestaurantState::default();
        }
        Err(err) => {
            tracing::warn!(error = %err, "could not read persisted state, starting from defaults");
            return RestaurantState::default();
        }
    };

    match snapshot::decode(&raw) {
        Ok(state) => {
            tracing::info!(
                products = state.products().len(),
                orders = state.orders().len(),
                next_order_number = state.next_order_number(),
                "restored persisted state"
            );
            state
        }
        Err(err) => {
            metrics::counter!("snapshot_discarded_total").increment(1);
            tracing::warn!(error = %err, "discarding corrupted snapshot");
            if let Err(err) = slot.clear().await {
                tracing::warn!(error = %err, "could not clear corrupted snapshot");
            }
            RestaurantState::default()
        }
    }
}

/// Single source of truth for the menu, cart, orders, settings and the
/// cached admin identity.
pub struct RestaurantStore {
    state: RwLock<RestaurantState>,
    images: Option<Arc<dyn ImageStorage>>,
    identity: Option<Arc<dyn IdentityService>>,
    login_limiter: Mutex<LoginRateLimiter>,
    sync: SyncWriter,
}

impl RestaurantStore {
    pub fn builder(slot: Arc<dyn SnapshotSlot>) -> RestaurantStoreBuilder {
        RestaurantStoreBuilder {
            slot,
            gateway: None,
            images: None,
            identity: None,
            debounce: DEFAULT_SYNC_DEBOUNCE,
            login_limiter: LoginRateLimiter::default(),
        }
    }

    /// Runs a command against the state and applies its events.
    ///
    /// Events are applied, the snapshot encoded and the sync job queued under
    /// one write lock, so a failed command leaves no partial effects and
    /// persisted revisions follow mutation order.
    async fn execute<T, E, C, V>(&self, command: C, value: V) -> Result<CommandResult<T>>
    where
        C: FnOnce(&RestaurantState) -> std::result::Result<Vec<StoreEvent>, E>,
        V: FnOnce(&RestaurantState) -> T,
        DomainError: From<E>,
    {
        let mut state = self.state.write().await;
        let events = command(&*state)?;

        if events.is_empty() {
            return Ok(CommandResult {
                value: value(&*state),
                events,
                sync: SyncHandle::ready(self.sync.revision()),
            });
        }

        for event in &events {
            metrics::counter!("store_events_applied_total", "type" => event.event_type())
                .increment(1);
        }
        tracing::debug!(
            events = ?events.iter().map(|e| e.event_type()).collect::<Vec<_>>(),
            "applying events"
        );
        state.apply_events(events.clone());

        let sync = match snapshot::encode(&state) {
            Ok(encoded) => self.sync.enqueue(encoded, mirror_ops(&events, &state)),
            Err(err) => {
                tracing::error!(error = %err, "could not encode snapshot");
                self.sync.reject(SyncError::SnapshotWrite(err.to_string()))
            }
        };

        Ok(CommandResult {
            value: value(&*state),
            events,
            sync,
        })
    }

    fn identity(&self) -> Result<&Arc<dyn IdentityService>> {
        self.identity.as_ref().ok_or_else(|| {
            IdentityError::Unavailable("Identity service is not configured".to_string()).into()
        })
    }

    fn limiter(&self) -> std::sync::MutexGuard<'_, LoginRateLimiter> {
        self.login_limiter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

// Catalog
impl RestaurantStore {
    /// Adds a product, uploading its image first when one is attached.
    ///
    /// A failed upload aborts the operation before any state changes.
    #[tracing::instrument(skip(self, form), fields(name = %form.name))]
    pub async fn add_product(
        &self,
        mut form: ProductForm,
    ) -> Result<CommandResult<Option<Product>>> {
        form.validate()?;

        let image = match form.image.take() {
            None => None,
            Some(ImageSource::Url(url)) => Some(url).filter(|u| !u.trim().is_empty()),
            Some(ImageSource::Upload { file, token }) => {
                let images = self.images.as_ref().ok_or_else(|| {
                    UploadError::Storage("Image storage is not configured".to_string())
                })?;
                let uploaded = images.upload(&token, file).await.inspect_err(|err| {
                    tracing::warn!(error = %err, "image upload failed");
                })?;
                Some(uploaded.url)
            }
        };

        let id = ProductId::generate();
        let result = self
            .execute(
                |s| s.add_product(id.clone(), &form, image, Utc::now()),
                |s| s.product(&id).cloned(),
            )
            .await?;

        tracing::info!(product_id = %id, "product added");
        Ok(result)
    }

    /// Partially updates a product. Unknown ids are a no-op.
    #[tracing::instrument(skip(self, patch))]
    pub async fn update_product(
        &self,
        id: &ProductId,
        patch: ProductPatch,
    ) -> Result<CommandResult<Option<Product>>> {
        self.execute(
            |s| s.update_product(id, patch, Utc::now()),
            |s| s.product(id).cloned(),
        )
        .await
    }

    /// Deletes a product. Returns whether it existed.
    #[tracing::instrument(skip(self))]
    pub async fn delete_product(&self, id: &ProductId) -> Result<CommandResult<bool>> {
        let result = self
            .execute(|s| Ok::<_, DomainError>(s.delete_product(id)), |_| ())
            .await?;
        Ok(CommandResult {
            value: !result.events.is_empty(),
            events: result.events,
            sync: result.sync,
        })
    }

    #[tracing::instrument(skip(self))]
    pub async fn add_category(
        &self,
        name: &str,
        description: Option<String>,
    ) -> Result<CommandResult<Option<Category>>> {
        let id = CategoryId::generate();
        self.execute(
            |s| s.add_category(id.clone(), name, description, Utc::now()),
            |s| s.category(&id).cloned(),
        )
        .await
    }

    /// Deletes a category no product references. Returns whether it existed.
    #[tracing::instrument(skip(self))]
    pub async fn delete_category(&self, id: &CategoryId) -> Result<CommandResult<bool>> {
        let result = self.execute(|s| s.delete_category(id), |_| ()).await?;
        Ok(CommandResult {
            value: !result.events.is_empty(),
            events: result.events,
            sync: result.sync,
        })
    }

    pub async fn products(&self) -> Vec<Product> {
        self.state.read().await.products().to_vec()
    }

    pub async fn product(&self, id: &ProductId) -> Option<Product> {
        self.state.read().await.product(id).cloned()
    }

    pub async fn available_products(&self) -> Vec<Product> {
        self.state.read().await.available_products().cloned().collect()
    }

    pub async fn products_in_category(&self, category: &str) -> Vec<Product> {
        self.state
            .read()
            .await
            .products_in_category(category)
            .cloned()
            .collect()
    }

    pub async fn product_count(&self, category: &str) -> usize {
        self.state.read().await.product_count(category)
    }

    pub async fn categories(&self) -> Vec<Category> {
        self.state.read().await.categories().to_vec()
    }
}

// Cart
impl RestaurantStore {
    #[tracing::instrument(skip(self))]
    pub async fn add_to_cart(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<CommandResult<Cart>> {
        let result = self
            .execute(|s| s.add_to_cart(product_id, quantity), |s| s.cart().clone())
            .await?;
        metrics::counter!("cart_mutations_total", "operation" => "add").increment(1);
        Ok(result)
    }

    /// Sets a line's quantity; zero or less removes the line.
    #[tracing::instrument(skip(self))]
    pub async fn update_cart_item(
        &self,
        product_id: &ProductId,
        quantity: i64,
    ) -> Result<CommandResult<Cart>> {
        let result = self
            .execute(
                |s| s.update_cart_item(product_id, quantity),
                |s| s.cart().clone(),
            )
            .await?;
        metrics::counter!("cart_mutations_total", "operation" => "update").increment(1);
        Ok(result)
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_from_cart(&self, product_id: &ProductId) -> Result<CommandResult<Cart>> {
        let result = self
            .execute(
                |s| Ok::<_, DomainError>(s.remove_from_cart(product_id)),
                |s| s.cart().clone(),
            )
            .await?;
        if !result.is_noop() {
            metrics::counter!("cart_mutations_total", "operation" => "remove").increment(1);
        }
        Ok(result)
    }

    #[tracing::instrument(skip(self))]
    pub async fn clear_cart(&self) -> Result<CommandResult<Cart>> {
        let result = self
            .execute(
                |s| Ok::<_, DomainError>(s.clear_cart()),
                |s| s.cart().clone(),
            )
            .await?;
        if !result.is_noop() {
            metrics::counter!("cart_mutations_total", "operation" => "clear").increment(1);
        }
        Ok(result)
    }

    pub async fn cart(&self) -> Cart {
        self.state.read().await.cart().clone()
    }

    /// Cart totals at the current tax and service charge rates.
    pub async fn cart_breakdown(&self) -> PriceBreakdown {
        self.state.read().await.cart_breakdown()
    }
}

// Orders
impl RestaurantStore {
    /// Turns the cart into a pending order.
    ///
    /// Placing the order, advancing the counter and clearing the cart happen
    /// together or not at all.
    #[tracing::instrument(skip(self))]
    pub async fn create_order(&self, table_number: &str) -> Result<CommandResult<Option<Order>>> {
        let id = OrderId::generate();
        let result = self
            .execute(
                |s| s.create_order(id.clone(), table_number, Utc::now()),
                |s| s.order(&id).cloned(),
            )
            .await?;

        if let Some(order) = &result.value {
            metrics::counter!("orders_created_total").increment(1);
            tracing::info!(
                order_id = %order.id,
                order_number = order.order_number,
                table = %order.table_number,
                total = %order.total,
                "order created"
            );
        }
        Ok(result)
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_order_status(
        &self,
        order_id: &OrderId,
        status: OrderStatus,
    ) -> Result<CommandResult<Option<Order>>> {
        let result = self
            .execute(
                |s| s.update_order_status(order_id, status, Utc::now()),
                |s| s.order(order_id).cloned(),
            )
            .await?;

        metrics::counter!("order_status_changes_total", "status" => status.as_str()).increment(1);
        tracing::info!(%order_id, %status, "order status updated");
        Ok(result)
    }

    /// Deletes all orders and restarts numbering at 1.
    #[tracing::instrument(skip(self))]
    pub async fn clear_order_history(&self) -> Result<CommandResult<()>> {
        let result = self
            .execute(|s| Ok::<_, DomainError>(s.clear_order_history()), |_| ())
            .await?;
        metrics::counter!("order_history_cleared_total").increment(1);
        tracing::warn!("order history cleared");
        Ok(result)
    }

    pub async fn orders(&self) -> Vec<Order> {
        self.state.read().await.orders().to_vec()
    }

    pub async fn find_order(&self, id: &OrderId) -> Option<Order> {
        self.state.read().await.order(id).cloned()
    }

    pub async fn filtered_orders(&self, filters: &OrderFilters) -> Vec<Order> {
        self.state
            .read()
            .await
            .filtered_orders(filters)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn next_order_number(&self) -> u64 {
        self.state.read().await.next_order_number()
    }
}

// Settings
impl RestaurantStore {
    #[tracing::instrument(skip(self, patch))]
    pub async fn update_settings(
        &self,
        patch: SettingsPatch,
    ) -> Result<CommandResult<RestaurantSettings>> {
        self.execute(|s| s.update_settings(patch), |s| s.settings().clone())
            .await
    }

    pub async fn settings(&self) -> RestaurantSettings {
        self.state.read().await.settings().clone()
    }
}

// Admin identity
impl RestaurantStore {
    /// Mirrors a profile from the identity service into the cache.
    pub async fn update_admin_credentials(
        &self,
        profile: Option<AdminProfile>,
    ) -> Result<CommandResult<()>> {
        self.execute(
            |s| Ok::<_, DomainError>(s.update_admin_credentials(profile)),
            |_| (),
        )
        .await
    }

    /// Mirrors the identity service's authentication flag into the cache.
    pub async fn set_authenticated(&self, authenticated: bool) -> Result<CommandResult<()>> {
        self.execute(
            |s| Ok::<_, DomainError>(s.set_authenticated(authenticated)),
            |_| (),
        )
        .await
    }

    async fn cache_identity(
        &self,
        profile: Option<AdminProfile>,
        authenticated: bool,
    ) -> Result<()> {
        self.execute(
            |s| {
                let mut events = s.update_admin_credentials(profile);
                events.extend(s.set_authenticated(authenticated));
                Ok::<_, DomainError>(events)
            },
            |_| (),
        )
        .await?;
        Ok(())
    }

    /// Signs an administrator in, throttling repeated failures.
    #[tracing::instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &SecretString) -> Result<AdminProfile> {
        let identity = self.identity()?;
        self.limiter().check(email)?;

        match identity.sign_in(email, password).await {
            Ok(profile) => {
                self.limiter().reset(email);
                self.cache_identity(Some(profile.clone()), true).await?;
                tracing::info!(uid = %profile.uid, "admin signed in");
                Ok(profile)
            }
            Err(err) => {
                if err == IdentityError::InvalidCredentials {
                    self.limiter().record_failure(email);
                }
                tracing::warn!(error = %err, "admin sign-in failed");
                Err(err.into())
            }
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<()> {
        self.identity()?.sign_out().await?;
        self.cache_identity(None, false).await
    }

    /// Creates the first admin account. Refused once any admin exists.
    #[tracing::instrument(skip(self, form), fields(email = %form.email))]
    pub async fn setup_admin(&self, form: AdminSetupForm) -> Result<AdminProfile> {
        let credentials = form.into_credentials()?;
        let identity = self.identity()?;

        if identity.check_admin_exists().await? {
            return Err(AdminError::AlreadyConfigured.into());
        }

        let profile = identity.create_admin(credentials).await?;
        self.cache_identity(Some(profile.clone()), true).await?;
        tracing::info!(uid = %profile.uid, "admin account created");
        Ok(profile)
    }

    pub async fn check_admin_exists(&self) -> Result<bool> {
        Ok(self.identity()?.check_admin_exists().await?)
    }

    /// Re-reads the identity service's session into the cache.
    pub async fn refresh_identity(&self) -> Result<AdminCache> {
        let identity = self.identity()?;
        let profile = identity.current_admin().await;
        let authenticated = identity.is_authenticated().await;
        self.cache_identity(profile, authenticated).await?;
        Ok(self.admin().await)
    }

    /// Returns true if `token` is the current admin session's token.
    pub async fn verify_admin_token(&self, token: &str) -> bool {
        match &self.identity {
            Some(identity) => identity.verify_token(token).await,
            None => false,
        }
    }

    /// Bearer token of the current admin session, if any.
    pub async fn session_token(&self) -> Option<String> {
        match &self.identity {
            Some(identity) => identity.id_token().await,
            None => None,
        }
    }

    pub async fn admin(&self) -> AdminCache {
        self.state.read().await.admin().clone()
    }
}

// Persistence
impl RestaurantStore {
    /// A copy of the whole state.
    pub async fn snapshot(&self) -> RestaurantState {
        self.state.read().await.clone()
    }

    /// True while some mutation is not yet persisted or the last write failed.
    pub fn is_dirty(&self) -> bool {
        self.sync.is_dirty()
    }

    /// Writes the current state and waits for it to be persisted.
    #[tracing::instrument(skip(self))]
    pub async fn flush(&self) -> Result<()> {
        let handle = {
            let state = self.state.read().await;
            let encoded = snapshot::encode(&state)?;
            self.sync.enqueue(encoded, Vec::new())
        };
        handle.wait().await?;
        Ok(())
    }
}
